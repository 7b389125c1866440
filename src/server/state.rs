// 该文件是 Jianwen （见闻） 项目的一部分。
// src/server/state.rs - 服务共享状态
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

use std::sync::Arc;

use crate::{
  answer::Answerer,
  model::Detector,
  server::config::ServerConfig,
  session::SessionStore,
  task::{AskTask, DetectTask},
};

pub type SharedDetector = Arc<dyn Detector>;
pub type SharedAnswerer = Arc<dyn Answerer>;

/// 所有处理函数共享的状态，克隆开销很小
#[derive(Clone)]
pub struct AppState {
  pub config: Arc<ServerConfig>,
  pub detect: Arc<DetectTask<SharedDetector>>,
  pub ask: Arc<AskTask<SharedAnswerer>>,
  pub sessions: Arc<SessionStore>,
}

impl AppState {
  pub fn new(
    config: ServerConfig,
    detect: DetectTask<SharedDetector>,
    ask: AskTask<SharedAnswerer>,
    sessions: SessionStore,
  ) -> Self {
    Self {
      config: Arc::new(config),
      detect: Arc::new(detect),
      ask: Arc::new(ask),
      sessions: Arc::new(sessions),
    }
  }
}
