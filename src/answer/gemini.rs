// 该文件是 Jianwen （见闻） 项目的一部分。
// src/answer/gemini.rs - Gemini 问答服务
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

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
  Client, StatusCode,
  header::{HeaderMap, HeaderValue, RETRY_AFTER},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  answer::{Answerer, AnswererError},
};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/";
const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
const GEMINI_DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Error, Debug)]
pub enum GeminiAnswererError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch {
    expected: &'static str,
    actual: String,
  },
  #[error("未设置环境变量 {0}")]
  MissingApiKey(&'static str),
  #[error("API 密钥无效")]
  InvalidApiKey,
  #[error("服务地址无效: {0}")]
  InvalidEndpoint(#[from] url::ParseError),
  #[error("HTTP 客户端创建失败: {0}")]
  ClientError(#[from] reqwest::Error),
}

/// 通过 `generateContent` 接口调用 Gemini
pub struct GeminiAnswerer {
  endpoint: Url,
  client: Client,
}

pub struct GeminiAnswererBuilder {
  model: String,
  api_key: Option<String>,
  api_base: String,
}

impl FromUrlWithScheme for GeminiAnswererBuilder {
  const SCHEME: &'static str = "gemini";
}

impl FromUrl for GeminiAnswererBuilder {
  type Error = GeminiAnswererError;

  /// `gemini://<model>`，省略模型名时使用默认模型
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GeminiAnswererError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }

    let model = url
      .host_str()
      .filter(|host| !host.is_empty())
      .unwrap_or(GEMINI_DEFAULT_MODEL)
      .to_string();

    Ok(GeminiAnswererBuilder {
      model,
      api_key: None,
      api_base: GEMINI_API_BASE.to_string(),
    })
  }
}

impl GeminiAnswererBuilder {
  pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
    self.api_key = Some(api_key.into());
    self
  }

  pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
    self.api_base = api_base.into();
    self
  }

  pub fn build(self) -> Result<GeminiAnswerer, GeminiAnswererError> {
    let api_key = match self.api_key {
      Some(key) => key,
      None => std::env::var(GEMINI_API_KEY_ENV)
        .map_err(|_| GeminiAnswererError::MissingApiKey(GEMINI_API_KEY_ENV))?,
    };

    let mut headers = HeaderMap::new();
    let mut key = HeaderValue::from_str(api_key.trim())
      .map_err(|_| GeminiAnswererError::InvalidApiKey)?;
    key.set_sensitive(true);
    headers.insert("x-goog-api-key", key);

    let endpoint =
      Url::parse(&self.api_base)?.join(&format!("models/{}:generateContent", self.model))?;
    let client = Client::builder().default_headers(headers).build()?;

    info!("Gemini 问答服务初始化完成, 模型: {}", self.model);
    Ok(GeminiAnswerer { endpoint, client })
  }
}

#[async_trait]
impl Answerer for GeminiAnswerer {
  async fn generate(&self, prompt: &str) -> Result<String, AnswererError> {
    let body = GenerateRequest {
      contents: vec![Content {
        parts: vec![Part { text: prompt }],
      }],
    };

    let resp = self
      .client
      .post(self.endpoint.clone())
      .json(&body)
      .send()
      .await
      .map_err(|e| {
        error!("调用 Gemini 接口失败: {}", e);
        AnswererError::Unavailable(e.to_string())
      })?;

    let status = resp.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
      let retry_after = parse_retry_after(resp.headers());
      error!("Gemini 接口限流, 建议等待: {:?}", retry_after);
      return Err(AnswererError::RateLimited { retry_after });
    }
    if !status.is_success() {
      let text = resp
        .text()
        .await
        .unwrap_or_else(|_| "<响应体不可用>".to_string());
      error!("Gemini 返回 {}: {}", status, text);
      let message = format!("{}: {}", status, text);
      // 只有服务端错误可能在重试后恢复
      return Err(if status.is_server_error() {
        AnswererError::Unavailable(message)
      } else {
        AnswererError::Rejected(message)
      });
    }

    let parsed: GenerateResponse = resp
      .json()
      .await
      .map_err(|e| AnswererError::Malformed(e.to_string()))?;
    let answer = parsed.into_text().ok_or_else(|| {
      AnswererError::Malformed("响应中没有候选回答".to_string())
    })?;
    debug!("Gemini 回答长度: {} 字符", answer.len());
    Ok(answer)
  }
}

/// 只支持秒数形式的 Retry-After
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
  headers
    .get(RETRY_AFTER)?
    .to_str()
    .ok()?
    .trim()
    .parse::<u64>()
    .ok()
    .map(Duration::from_secs)
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
  contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
  parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
  text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
  #[serde(default)]
  candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
  content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
  #[serde(default)]
  parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
  text: Option<String>,
}

impl GenerateResponse {
  fn into_text(self) -> Option<String> {
    let content = self.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().filter_map(|part| part.text).collect();
    (!text.is_empty()).then_some(text)
  }
}
