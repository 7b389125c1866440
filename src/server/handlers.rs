// 该文件是 Jianwen （见闻） 项目的一部分。
// src/server/handlers.rs - HTTP 处理函数
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

use std::time::{Duration, Instant};

use axum::{
  Json,
  extract::{Multipart, State},
  http::StatusCode,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::{
  model::{DetectionRecord, DropCounts, QaExchange, duration_secs},
  server::{
    auth::Caller,
    error::{AppError, AppResult},
    state::AppState,
  },
  task::ContextOrder,
};

const UPLOAD_FIELD: &str = "file";

/// `POST /api/detect` 的响应
#[derive(Debug, Serialize)]
pub struct DetectResponse {
  /// `data:image/png;base64,...`
  pub annotated_image: String,
  pub detections: Vec<DetectionRecord>,
  /// 归一化耗时（秒）
  #[serde(with = "duration_secs")]
  pub processing_time: Duration,
  /// 含检测服务调用在内的总耗时（秒）
  #[serde(with = "duration_secs")]
  pub total_time: Duration,
  pub dropped: DropCounts,
}

/// `POST /api/ask` 的请求体
///
/// 携带 `detections` 时不读写会话，历史取自请求本身；否则使用调用方会话中
/// 最近一次检测的结果与历史。
#[derive(Debug, Deserialize)]
pub struct AskRequest {
  pub question: String,
  #[serde(default)]
  pub detections: Option<Vec<DetectionRecord>>,
  #[serde(default)]
  pub history: Option<Vec<QaExchange>>,
  /// 兼容旧客户端，不参与回答
  #[serde(default)]
  pub image_base64: Option<String>,
  #[serde(default)]
  pub order: ContextOrder,
}

/// GET /
pub async fn root() -> Json<Value> {
  Json(json!({
    "message": "Jianwen object detection API",
    "version": env!("CARGO_PKG_VERSION"),
    "health": "/health",
  }))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
  Json(json!({
    "status": "healthy",
    "version": env!("CARGO_PKG_VERSION"),
    "sessions": state.sessions.len(),
    "time": chrono::Utc::now().to_rfc3339(),
  }))
}

/// POST /api/detect
///
/// 接收 multipart 表单中的 `file` 字段，检测完成后替换调用方会话中的检测结果。
pub async fn detect(
  State(state): State<AppState>,
  caller: Caller,
  mut multipart: Multipart,
) -> AppResult<Json<DetectResponse>> {
  let started = Instant::now();
  let mut image = None;

  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|e| AppError::BadRequest(e.to_string()))?
  {
    if field.name() != Some(UPLOAD_FIELD) {
      continue;
    }
    let is_image = field
      .content_type()
      .is_some_and(|content_type| content_type.starts_with("image/"));
    if !is_image {
      return Err(AppError::BadRequest("上传的文件必须是图像".into()));
    }
    let bytes = field
      .bytes()
      .await
      .map_err(|e| AppError::BadRequest(e.to_string()))?;
    image = Some(bytes);
    break;
  }

  let image = image.ok_or_else(|| AppError::BadRequest(format!("缺少 '{}' 字段", UPLOAD_FIELD)))?;
  let result = state.detect.run(&image).await?;

  // 只有完整的检测结果才会写入会话
  let generation = state
    .sessions
    .begin_detection(&caller.id, result.detections().to_vec());
  let total_time = started.elapsed();
  info!(
    caller = %caller.id,
    %generation,
    detections = result.detections().len(),
    "检测完成，总耗时 {:.2?}",
    total_time
  );

  Ok(Json(DetectResponse {
    annotated_image: format!(
      "data:image/png;base64,{}",
      STANDARD.encode(result.annotated_image())
    ),
    detections: result.detections().to_vec(),
    processing_time: result.processing_time(),
    total_time,
    dropped: result.dropped(),
  }))
}

/// POST /api/ask
pub async fn ask(
  State(state): State<AppState>,
  caller: Caller,
  Json(request): Json<AskRequest>,
) -> AppResult<Json<QaExchange>> {
  if request.image_base64.is_some() {
    debug!("忽略请求中的 image_base64 字段");
  }

  if let Some(detections) = request.detections {
    let history = request.history.unwrap_or_default();
    let exchange = state
      .ask
      .run(&request.question, &detections, request.order, &history)
      .await?;
    return Ok(Json(exchange));
  }

  let snapshot = state
    .sessions
    .snapshot(&caller.id)
    .ok_or(AppError::NoActiveDetection)?;
  let exchange = state
    .ask
    .run(
      &request.question,
      &snapshot.detections,
      request.order,
      &snapshot.history,
    )
    .await?;

  if !state
    .sessions
    .record_exchange(&caller.id, snapshot.generation, exchange.clone())
  {
    warn!(caller = %caller.id, "回答期间会话已更新，丢弃该回答");
    return Err(AppError::StaleSession);
  }

  Ok(Json(exchange))
}

/// DELETE /api/session
pub async fn end_session(State(state): State<AppState>, caller: Caller) -> StatusCode {
  if state.sessions.end(&caller.id) {
    info!(caller = %caller.id, "会话已结束");
  }
  StatusCode::NO_CONTENT
}
