// 该文件是 Jianwen （见闻） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use jianwen::{
  FromUrl,
  answer::{GeminiAnswererBuilder, Orchestrator},
  context::ContextBuilder,
  model::{HttpDetectorBuilder, LabelVocabulary},
  normalize::{Normalizer, draw::Draw},
  server::{self, AppState, state::SharedAnswerer, state::SharedDetector},
  session::SessionStore,
  task::{AskTask, DetectTask},
};

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
    )
    .init();

  let args = args::Args::parse();

  info!("Jianwen 检测问答服务");
  info!("检测服务: {}", args.detector);
  info!("问答服务: {}", args.answerer);
  info!("置信度阈值: {}", args.confidence);

  let vocabulary = match &args.labels {
    Some(path) => LabelVocabulary::from_file(path)
      .with_context(|| format!("读取标签文件失败: {}", path.display()))?,
    None => LabelVocabulary::coco(),
  };
  info!("类别数: {}", vocabulary.len());

  let draw = match &args.label_font {
    Some(path) => Draw::default()
      .with_font_file(path)
      .with_context(|| format!("加载字体失败: {}", path.display()))?
      .with_font_size(args.label_font_size),
    None => Draw::default(),
  };

  let detector: SharedDetector = Arc::new(
    HttpDetectorBuilder::from_url(&args.detector)?
      .confidence_threshold(args.confidence)
      .build()?,
  );
  let answerer: SharedAnswerer = Arc::new(GeminiAnswererBuilder::from_url(&args.answerer)?.build()?);

  let detect = DetectTask::new(detector, Normalizer::new(vocabulary, draw))
    .with_timeout(args.detect_timeout());
  let ask = AskTask::new(
    ContextBuilder::new(args.context_policy()),
    Orchestrator::new(answerer, args.orchestrator_config()),
  );
  let sessions = SessionStore::new(args.history_policy());

  let config = args.server_config();
  let addr = format!("{}:{}", config.host, config.port);
  let app = server::router(AppState::new(config, detect, ask, sessions));

  let listener = tokio::net::TcpListener::bind(&addr)
    .await
    .with_context(|| format!("监听 {} 失败", addr))?;
  info!("服务已启动: http://{}", addr);

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  info!("服务已停止");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!("监听退出信号失败: {}", e);
    return;
  }
  info!("收到退出信号，正在停止服务...");
}
