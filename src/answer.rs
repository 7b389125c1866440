// 该文件是 Jianwen （见闻） 项目的一部分。
// src/answer.rs - 基于检测上下文的问答
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

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::{context::QaContext, model::QaExchange};

#[cfg(feature = "gemini")]
mod gemini;
#[cfg(feature = "gemini")]
pub use self::gemini::{GeminiAnswerer, GeminiAnswererBuilder, GeminiAnswererError};

pub const DEFAULT_MAX_HISTORY_TURNS: usize = 10;
pub const DEFAULT_MAX_QUESTION_CHARS: usize = 500;
pub const DEFAULT_ANSWER_TIMEOUT: Duration = Duration::from_secs(60);

const GROUNDING_INSTRUCTION: &str = "You are an AI assistant helping users understand object detection results. \
Answer using only the detection data provided below. Do not use outside knowledge about the image. \
If the detection data is insufficient to answer the question, say explicitly that the detection results do not contain that information.";

/// 外部问答服务返回的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnswererError {
  #[error("问答服务不可用: {0}")]
  Unavailable(String),
  #[error("问答服务限流")]
  RateLimited { retry_after: Option<Duration> },
  #[error("问答服务响应格式错误: {0}")]
  Malformed(String),
  /// 请求被服务拒绝（如密钥无效、参数错误），重试无意义
  #[error("问答服务拒绝请求: {0}")]
  Rejected(String),
}

/// 外部问答服务，每次调用对应一次外部请求
#[async_trait]
pub trait Answerer: Send + Sync {
  async fn generate(&self, prompt: &str) -> Result<String, AnswererError>;
}

#[async_trait]
impl<T: Answerer + ?Sized> Answerer for Arc<T> {
  async fn generate(&self, prompt: &str) -> Result<String, AnswererError> {
    (**self).generate(prompt).await
  }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QaError {
  #[error("问题无效: {0}")]
  InvalidQuestion(String),
  #[error("问答服务不可用: {0}")]
  AnswererUnavailable(String),
  #[error("问答服务限流")]
  RateLimited { retry_after: Option<Duration> },
  #[error("问答服务返回无效回答: {0}")]
  MalformedAnswer(String),
  #[error("问答服务拒绝请求: {0}")]
  AnswererRejected(String),
  #[error("问答服务超时: {0:?}")]
  Timeout(Duration),
}

impl From<AnswererError> for QaError {
  fn from(err: AnswererError) -> Self {
    match err {
      AnswererError::Unavailable(msg) => QaError::AnswererUnavailable(msg),
      AnswererError::RateLimited { retry_after } => QaError::RateLimited { retry_after },
      AnswererError::Malformed(msg) => QaError::MalformedAnswer(msg),
      AnswererError::Rejected(msg) => QaError::AnswererRejected(msg),
    }
  }
}

/// 重试策略：最多自动重试一次，且只针对服务不可用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
  max_retries: u32,
  backoff: Duration,
}

impl RetryPolicy {
  pub fn none() -> Self {
    Self::default()
  }

  /// 超过 1 的重试次数按 1 处理
  pub fn new(max_retries: u32, backoff: Duration) -> Self {
    Self {
      max_retries: max_retries.min(1),
      backoff,
    }
  }

  pub fn max_retries(&self) -> u32 {
    self.max_retries
  }

  pub fn backoff(&self) -> Duration {
    self.backoff
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPolicy {
  /// 提示词中保留的最近问答轮数，更早的轮次直接丢弃
  pub max_turns: usize,
}

impl Default for HistoryPolicy {
  fn default() -> Self {
    Self {
      max_turns: DEFAULT_MAX_HISTORY_TURNS,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
  pub retry: RetryPolicy,
  pub history: HistoryPolicy,
  pub answer_timeout: Duration,
  pub max_question_chars: usize,
}

impl Default for OrchestratorConfig {
  fn default() -> Self {
    Self {
      retry: RetryPolicy::none(),
      history: HistoryPolicy::default(),
      answer_timeout: DEFAULT_ANSWER_TIMEOUT,
      max_question_chars: DEFAULT_MAX_QUESTION_CHARS,
    }
  }
}

/// 组装提示词并调用问答服务
pub struct Orchestrator<A> {
  answerer: A,
  config: OrchestratorConfig,
}

impl<A: Answerer> Orchestrator<A> {
  pub fn new(answerer: A, config: OrchestratorConfig) -> Self {
    Self { answerer, config }
  }

  pub fn config(&self) -> &OrchestratorConfig {
    &self.config
  }

  pub async fn answer(
    &self,
    question: &str,
    context: &QaContext,
    history: &[QaExchange],
  ) -> Result<QaExchange, QaError> {
    let question = self.validate_question(question)?;
    let started = Instant::now();
    let prompt = build_prompt(context, self.trim_history(history), question);
    debug!("提示词长度: {} 字符", prompt.len());

    let answer = self.generate_with_retry(&prompt).await?;
    if answer.trim().is_empty() {
      warn!("问答服务返回空回答");
      return Err(QaError::MalformedAnswer("回答为空".to_string()));
    }

    let processing_time = started.elapsed();
    info!("问答完成，耗时: {:.2?}", processing_time);
    Ok(QaExchange {
      question: question.to_string(),
      answer,
      processing_time,
    })
  }

  fn validate_question<'q>(&self, question: &'q str) -> Result<&'q str, QaError> {
    let question = question.trim();
    if question.is_empty() {
      return Err(QaError::InvalidQuestion("问题不能为空".to_string()));
    }
    let chars = question.chars().count();
    if chars > self.config.max_question_chars {
      return Err(QaError::InvalidQuestion(format!(
        "问题长度 {} 超过上限 {}",
        chars, self.config.max_question_chars
      )));
    }
    Ok(question)
  }

  fn trim_history<'h>(&self, history: &'h [QaExchange]) -> &'h [QaExchange] {
    let skip = history.len().saturating_sub(self.config.history.max_turns);
    &history[skip..]
  }

  async fn generate_with_retry(&self, prompt: &str) -> Result<String, QaError> {
    let mut attempt = 0;
    loop {
      match self.generate_once(prompt).await {
        Err(QaError::AnswererUnavailable(msg)) if attempt < self.config.retry.max_retries() => {
          attempt += 1;
          warn!(
            "问答服务不可用: {}，{:?} 后重试 ({}/{})",
            msg,
            self.config.retry.backoff(),
            attempt,
            self.config.retry.max_retries()
          );
          sleep(self.config.retry.backoff()).await;
        }
        result => return result,
      }
    }
  }

  async fn generate_once(&self, prompt: &str) -> Result<String, QaError> {
    let limit = self.config.answer_timeout;
    match timeout(limit, self.answerer.generate(prompt)).await {
      Ok(result) => result.map_err(QaError::from),
      Err(_) => {
        warn!("问答服务超时: {:?}", limit);
        Err(QaError::Timeout(limit))
      }
    }
  }
}

/// 提示词依次包含：约束说明、检测上下文、历史问答、当前问题
pub fn build_prompt(context: &QaContext, history: &[QaExchange], question: &str) -> String {
  let mut parts = vec![
    GROUNDING_INSTRUCTION.to_string(),
    context.text().to_string(),
  ];
  if !history.is_empty() {
    let mut turns = String::from("Previous Conversation:");
    for exchange in history {
      turns.push_str("\nQ: ");
      turns.push_str(exchange.question.trim());
      turns.push_str("\nA: ");
      turns.push_str(exchange.answer.trim());
    }
    parts.push(turns);
  }
  parts.push(format!("User Question: {}", question));
  parts.push(
    "Please provide a clear, concise, and accurate answer based only on the detection data."
      .to_string(),
  );
  parts.join("\n\n")
}
