// 该文件是 Jianwen （见闻） 项目的一部分。
// tests/common/mod.rs - 集成测试公共工具
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

#![allow(dead_code)]

use std::{
  collections::VecDeque,
  io::Cursor,
  sync::{Arc, Mutex},
};

use async_trait::async_trait;
use axum::{
  Router,
  body::Body,
  http::{Request, Response, header},
};
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, RgbImage};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::Value;
use tower::ServiceExt;

use jianwen::{
  answer::{Answerer, AnswererError, Orchestrator, OrchestratorConfig},
  context::ContextBuilder,
  model::{CoordinateSpace, Detector, DetectorError, RawDetectorOutput, RawObject},
  normalize::Normalizer,
  server::{
    self, AppState, ServerConfig,
    auth::Claims,
    state::{SharedAnswerer, SharedDetector},
  },
  session::SessionStore,
  task::{AskTask, DetectTask},
};

pub const TEST_SECRET: &str = "test-secret";
pub const BOUNDARY: &str = "jianwen-test-boundary";

/// 固定输出的检测器
pub struct StubDetector {
  output: Result<RawDetectorOutput, DetectorError>,
}

impl StubDetector {
  pub fn returning(objects: Vec<RawObject>) -> Self {
    Self {
      output: Ok(RawDetectorOutput {
        coordinates: CoordinateSpace::Pixels,
        objects,
      }),
    }
  }

  pub fn failing(err: DetectorError) -> Self {
    Self { output: Err(err) }
  }
}

#[async_trait]
impl Detector for StubDetector {
  async fn detect(&self, _image: &[u8]) -> Result<RawDetectorOutput, DetectorError> {
    match &self.output {
      Ok(output) => Ok(output.clone()),
      Err(DetectorError::Unavailable(msg)) => Err(DetectorError::Unavailable(msg.clone())),
      Err(DetectorError::Malformed(msg)) => Err(DetectorError::Malformed(msg.clone())),
      Err(DetectorError::Timeout(limit)) => Err(DetectorError::Timeout(*limit)),
    }
  }
}

type Hook = Box<dyn Fn() + Send + Sync>;

/// 按顺序返回预设结果的问答服务，并记录收到的提示词
#[derive(Default)]
pub struct StubAnswerer {
  replies: Mutex<VecDeque<Result<String, AnswererError>>>,
  prompts: Mutex<Vec<String>>,
  on_generate: Mutex<Option<Hook>>,
}

impl StubAnswerer {
  pub fn new(replies: Vec<Result<String, AnswererError>>) -> Arc<Self> {
    Arc::new(Self {
      replies: Mutex::new(replies.into()),
      ..Default::default()
    })
  }

  /// 每次生成回答前执行，用于模拟回答期间的并发操作
  pub fn set_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
    *self.on_generate.lock().unwrap() = Some(Box::new(hook));
  }

  pub fn prompts(&self) -> Vec<String> {
    self.prompts.lock().unwrap().clone()
  }

  pub fn calls(&self) -> usize {
    self.prompts.lock().unwrap().len()
  }
}

#[async_trait]
impl Answerer for StubAnswerer {
  async fn generate(&self, prompt: &str) -> Result<String, AnswererError> {
    self.prompts.lock().unwrap().push(prompt.to_string());
    if let Some(hook) = self.on_generate.lock().unwrap().as_ref() {
      hook();
    }
    self
      .replies
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or_else(|| Ok("default answer".to_string()))
  }
}

pub fn raw(class_id: i64, score: f64, bbox: [f64; 4]) -> RawObject {
  RawObject {
    class_id,
    score,
    bbox,
  }
}

pub fn test_config() -> ServerConfig {
  ServerConfig {
    host: "127.0.0.1".to_string(),
    port: 0,
    cors_origins: vec!["*".to_string()],
    jwt_secret: TEST_SECRET.to_string(),
    max_upload_bytes: 1024 * 1024,
  }
}

pub struct TestApp {
  pub router: Router,
  pub sessions: Arc<SessionStore>,
  pub answerer: Arc<StubAnswerer>,
}

/// 使用与 `main.rs` 相同的路由与中间件
pub fn build_test_app(detector: StubDetector, answerer: Arc<StubAnswerer>) -> TestApp {
  let detector: SharedDetector = Arc::new(detector);
  let shared: SharedAnswerer = answerer.clone();
  let sessions = Arc::new(SessionStore::default());
  let state = AppState {
    config: Arc::new(test_config()),
    detect: Arc::new(DetectTask::new(detector, Normalizer::default())),
    ask: Arc::new(AskTask::new(
      ContextBuilder::default(),
      Orchestrator::new(shared, OrchestratorConfig::default()),
    )),
    sessions: sessions.clone(),
  };

  TestApp {
    router: server::router(state),
    sessions,
    answerer,
  }
}

pub fn token_for(sub: &str) -> String {
  let claims = Claims {
    sub: sub.to_string(),
    exp: chrono::Utc::now().timestamp() + 600,
  };
  encode(
    &Header::default(),
    &claims,
    &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
  )
  .unwrap()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
  let mut bytes = Vec::new();
  DynamicImage::ImageRgb8(RgbImage::new(width, height))
    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
    .unwrap();
  bytes
}

pub fn multipart_body(field: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
  let mut body = Vec::new();
  body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
  body.extend_from_slice(
    format!(
      "Content-Disposition: form-data; name=\"{}\"; filename=\"upload\"\r\n",
      field
    )
    .as_bytes(),
  );
  body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
  body.extend_from_slice(data);
  body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
  body
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
  let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
  app.clone().oneshot(request).await.unwrap()
}

pub async fn post_detect(
  app: &Router,
  token: Option<&str>,
  content_type: &str,
  data: &[u8],
) -> Response<Body> {
  let mut request = Request::builder()
    .method("POST")
    .uri("/api/detect")
    .header(
      header::CONTENT_TYPE,
      format!("multipart/form-data; boundary={}", BOUNDARY),
    );
  if let Some(token) = token {
    request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
  }
  let body = multipart_body("file", content_type, data);
  app
    .clone()
    .oneshot(request.body(Body::from(body)).unwrap())
    .await
    .unwrap()
}

pub async fn post_ask(app: &Router, token: Option<&str>, body: Value) -> Response<Body> {
  let mut request = Request::builder()
    .method("POST")
    .uri("/api/ask")
    .header(header::CONTENT_TYPE, "application/json");
  if let Some(token) = token {
    request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
  }
  app
    .clone()
    .oneshot(request.body(Body::from(body.to_string())).unwrap())
    .await
    .unwrap()
}

pub async fn delete_session(app: &Router, token: &str) -> Response<Body> {
  let request = Request::builder()
    .method("DELETE")
    .uri("/api/session")
    .header(header::AUTHORIZATION, format!("Bearer {}", token))
    .body(Body::empty())
    .unwrap();
  app.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
  let bytes = response.into_body().collect().await.unwrap().to_bytes();
  serde_json::from_slice(&bytes).unwrap()
}
