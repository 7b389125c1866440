// 该文件是 Jianwen （见闻） 项目的一部分。
// src/server/error.rs - HTTP 错误映射
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

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header::RETRY_AFTER},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{
  answer::QaError,
  model::DetectorError,
  normalize::NormalizeError,
  task::DetectTaskError,
};

#[derive(Error, Debug)]
pub enum AppError {
  #[error(transparent)]
  Detect(#[from] DetectTaskError),
  #[error(transparent)]
  Qa(#[from] QaError),
  #[error("未授权: {0}")]
  Unauthorized(String),
  #[error("请求无效: {0}")]
  BadRequest(String),
  #[error("当前会话没有检测结果")]
  NoActiveDetection,
  #[error("回答期间会话已切换到新的检测结果")]
  StaleSession,
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let message = self.to_string();
    let mut retry_after = None;

    let (status, code) = match &self {
      AppError::Detect(DetectTaskError::Detector(err)) => match err {
        DetectorError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "DETECTOR_UNAVAILABLE"),
        DetectorError::Malformed(_) => (StatusCode::BAD_GATEWAY, "DETECTOR_MALFORMED"),
        DetectorError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "DETECTOR_TIMEOUT"),
      },
      AppError::Detect(DetectTaskError::Normalize(err)) => match err {
        NormalizeError::Decode(_) => (StatusCode::BAD_REQUEST, "INVALID_IMAGE"),
        NormalizeError::InvalidModelSpace { .. } => {
          (StatusCode::BAD_GATEWAY, "DETECTOR_MALFORMED")
        }
        NormalizeError::Encode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
      },
      AppError::Detect(DetectTaskError::Join(_)) => {
        (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
      }
      AppError::Qa(err) => match err {
        QaError::InvalidQuestion(_) => (StatusCode::BAD_REQUEST, "INVALID_QUESTION"),
        QaError::AnswererUnavailable(_) => {
          (StatusCode::SERVICE_UNAVAILABLE, "ANSWERER_UNAVAILABLE")
        }
        QaError::RateLimited { retry_after: after } => {
          retry_after = *after;
          (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED")
        }
        QaError::MalformedAnswer(_) => (StatusCode::BAD_GATEWAY, "MALFORMED_ANSWER"),
        QaError::AnswererRejected(_) => (StatusCode::BAD_GATEWAY, "ANSWERER_REJECTED"),
        QaError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "ANSWERER_TIMEOUT"),
      },
      AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
      AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
      AppError::NoActiveDetection => (StatusCode::CONFLICT, "NO_ACTIVE_DETECTION"),
      AppError::StaleSession => (StatusCode::CONFLICT, "STALE_SESSION"),
    };

    if status.is_server_error() {
      error!(code, error = %message, "请求处理失败");
    }

    let body = json!({
      "error": message,
      "code": code,
      "retry_after": retry_after.map(|after| after.as_secs()),
    });

    let mut response = (status, Json(body)).into_response();
    if let Some(after) = retry_after {
      response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(after.as_secs()));
    }
    response
  }
}
