// 该文件是 Jianwen （见闻） 项目的一部分。
// src/server.rs - HTTP 服务
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

use axum::{
  Router,
  extract::DefaultBodyLimit,
  http::{
    HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
  },
  routing::{delete, get, post},
};
use tower_http::{
  catch_panic::CatchPanicLayer,
  cors::{Any, CorsLayer},
  request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
  trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, warn};

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

pub use self::config::ServerConfig;
pub use self::error::{AppError, AppResult};
pub use self::state::AppState;

pub fn router(state: AppState) -> Router {
  let api = Router::new()
    .route("/detect", post(handlers::detect))
    .route("/ask", post(handlers::ask))
    .route("/session", delete(handlers::end_session))
    .layer(DefaultBodyLimit::max(state.config.max_upload_bytes));

  Router::new()
    .route("/", get(handlers::root))
    .route("/health", get(handlers::health))
    .nest("/api", api)
    .layer(CatchPanicLayer::new())
    .layer(PropagateRequestIdLayer::x_request_id())
    .layer(
      TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    .layer(cors_layer(&state.config))
    .with_state(state)
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
  let layer = CorsLayer::new()
    .allow_methods([Method::GET, Method::POST, Method::DELETE])
    .allow_headers([CONTENT_TYPE, AUTHORIZATION])
    .max_age(Duration::from_secs(3600));

  if config.allows_any_origin() {
    return layer.allow_origin(Any);
  }

  let origins: Vec<HeaderValue> = config
    .cors_origins
    .iter()
    .filter_map(|origin| match origin.parse() {
      Ok(value) => Some(value),
      Err(_) => {
        warn!("忽略无效的跨域来源: {}", origin);
        None
      }
    })
    .collect();
  layer.allow_origin(origins)
}
