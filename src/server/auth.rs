// 该文件是 Jianwen （见闻） 项目的一部分。
// src/server/auth.rs - 调用方认证
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
  extract::FromRequestParts,
  http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::server::{error::AppError, state::AppState};

/// 访问令牌载荷，`sub` 即会话键
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
  pub sub: String,
  pub exp: i64,
}

/// 从 `Authorization: Bearer <token>` 中解析出的调用方
#[derive(Debug, Clone)]
pub struct Caller {
  pub id: String,
}

impl FromRequestParts<AppState> for Caller {
  type Rejection = AppError;

  async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
    let header = parts
      .headers
      .get(AUTHORIZATION)
      .and_then(|v| v.to_str().ok())
      .ok_or_else(|| AppError::Unauthorized("缺少 Authorization 请求头".into()))?;

    let token = header
      .strip_prefix("Bearer ")
      .ok_or_else(|| AppError::Unauthorized("格式应为 Bearer <token>".into()))?;

    let claims = validate_token(token, &state.config.jwt_secret)?;
    if claims.sub.trim().is_empty() {
      return Err(AppError::Unauthorized("令牌缺少调用方标识".into()));
    }

    Ok(Caller { id: claims.sub })
  }
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AppError> {
  let data = decode::<Claims>(
    token,
    &DecodingKey::from_secret(secret.as_bytes()),
    &Validation::new(Algorithm::HS256),
  )
  .map_err(|e| {
    debug!("令牌校验失败: {}", e);
    AppError::Unauthorized("令牌无效或已过期".into())
  })?;
  Ok(data.claims)
}

#[cfg(test)]
mod tests {
  use assert_matches::assert_matches;
  use jsonwebtoken::{EncodingKey, Header, encode};

  use super::*;

  fn token(sub: &str, exp: i64, secret: &str) -> String {
    let claims = Claims {
      sub: sub.to_string(),
      exp,
    };
    encode(
      &Header::default(),
      &claims,
      &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
  }

  #[test]
  fn accepts_valid_token() {
    let exp = chrono::Utc::now().timestamp() + 600;
    let claims = validate_token(&token("alice", exp, "secret"), "secret").unwrap();
    assert_eq!(claims.sub, "alice");
  }

  #[test]
  fn rejects_wrong_secret_and_expired_token() {
    let exp = chrono::Utc::now().timestamp() + 600;
    assert_matches!(
      validate_token(&token("alice", exp, "other"), "secret"),
      Err(AppError::Unauthorized(_))
    );

    let expired = chrono::Utc::now().timestamp() - 3600;
    assert_matches!(
      validate_token(&token("alice", expired, "secret"), "secret"),
      Err(AppError::Unauthorized(_))
    );
  }
}
