// 该文件是 Jianwen （见闻） 项目的一部分。
// src/args.rs - 服务参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use url::Url;

use jianwen::{
  answer::{HistoryPolicy, OrchestratorConfig, RetryPolicy},
  context::ContextPolicy,
  server::{ServerConfig, config::DEFAULT_MAX_UPLOAD_BYTES},
};

/// Jianwen 服务参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监听地址
  #[arg(long, env = "HOST", default_value = "0.0.0.0")]
  pub host: String,

  /// 监听端口
  #[arg(long, env = "PORT", default_value = "8000")]
  pub port: u16,

  /// 检测服务地址（http:// 或 https://）
  #[arg(long, env = "DETECTOR_URL", value_name = "URL")]
  pub detector: Url,

  /// 问答服务（gemini://<model>），API 密钥取自 GEMINI_API_KEY
  #[arg(long, env = "ANSWERER_URL", default_value = "gemini://gemini-2.5-flash", value_name = "URL")]
  pub answerer: Url,

  /// 校验访问令牌的 HS256 密钥
  #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
  pub jwt_secret: String,

  /// 允许的跨域来源，逗号分隔，`*` 表示任意来源
  #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
  pub cors_origins: Vec<String>,

  /// 标签文件（每行一个类别名称），默认使用 COCO 类别
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 标签字体文件，不指定时只绘制边框
  #[arg(long, value_name = "FILE")]
  pub label_font: Option<PathBuf>,

  /// 标签字号（像素）
  #[arg(long, default_value = "16")]
  pub label_font_size: f32,

  /// 检测置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// 上下文中最多列出的检测记录数
  #[arg(long, default_value = "200")]
  pub max_detections: usize,

  /// 提示词中保留的历史问答轮数
  #[arg(long, default_value = "10")]
  pub max_history: usize,

  /// 问题最大字符数
  #[arg(long, default_value = "500")]
  pub max_question_chars: usize,

  /// 问答服务不可用时的自动重试次数（0 或 1）
  #[arg(long, default_value = "0", value_parser = clap::value_parser!(u32).range(0..=1))]
  pub answer_retries: u32,

  /// 重试前的等待时间（毫秒）
  #[arg(long, default_value = "500")]
  pub retry_backoff_ms: u64,

  /// 检测服务超时（秒）
  #[arg(long, default_value = "10")]
  pub detect_timeout_secs: u64,

  /// 问答服务超时（秒）
  #[arg(long, default_value = "60")]
  pub answer_timeout_secs: u64,

  /// 上传图像大小上限（字节）
  #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
  pub max_upload_bytes: usize,
}

impl Args {
  pub fn server_config(&self) -> ServerConfig {
    ServerConfig {
      host: self.host.clone(),
      port: self.port,
      cors_origins: self
        .cors_origins
        .iter()
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect(),
      jwt_secret: self.jwt_secret.clone(),
      max_upload_bytes: self.max_upload_bytes,
    }
  }

  pub fn context_policy(&self) -> ContextPolicy {
    ContextPolicy {
      max_detections: self.max_detections,
    }
  }

  pub fn history_policy(&self) -> HistoryPolicy {
    HistoryPolicy {
      max_turns: self.max_history,
    }
  }

  pub fn orchestrator_config(&self) -> OrchestratorConfig {
    OrchestratorConfig {
      retry: RetryPolicy::new(
        self.answer_retries,
        Duration::from_millis(self.retry_backoff_ms),
      ),
      history: self.history_policy(),
      answer_timeout: Duration::from_secs(self.answer_timeout_secs),
      max_question_chars: self.max_question_chars,
    }
  }

  pub fn detect_timeout(&self) -> Duration {
    Duration::from_secs(self.detect_timeout_secs)
  }
}
