// 该文件是 Jianwen （见闻） 项目的一部分。
// src/task.rs - 检测与问答任务
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

use std::{
  sync::Arc,
  time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
  task::{JoinError, spawn_blocking},
  time::timeout,
};
use tracing::{info, warn};

use crate::{
  answer::{Answerer, Orchestrator, QaError},
  context::ContextBuilder,
  model::{
    DetectionRecord, DetectionResult, Detector, DetectorError, QaExchange, sort_by_class,
    sort_by_confidence,
  },
  normalize::{NormalizeError, Normalizer},
};

pub const DEFAULT_DETECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum DetectTaskError {
  #[error("检测失败: {0}")]
  Detector(#[from] DetectorError),
  #[error("归一化失败: {0}")]
  Normalize(#[from] NormalizeError),
  #[error("图像处理任务异常退出: {0}")]
  Join(#[from] JoinError),
}

/// 调用检测器并归一化其输出
pub struct DetectTask<D> {
  detector: D,
  normalizer: Arc<Normalizer>,
  detect_timeout: Duration,
}

impl<D: Detector> DetectTask<D> {
  pub fn new(detector: D, normalizer: Normalizer) -> Self {
    Self {
      detector,
      normalizer: Arc::new(normalizer),
      detect_timeout: DEFAULT_DETECT_TIMEOUT,
    }
  }

  pub fn with_timeout(mut self, detect_timeout: Duration) -> Self {
    self.detect_timeout = detect_timeout;
    self
  }

  /// 先解码图像，无法解码的图像不会发送给检测器
  ///
  /// 解码、绘制与编码在阻塞线程池中执行，不占用异步运行时。
  pub async fn run(&self, image_bytes: &[u8]) -> Result<DetectionResult, DetectTaskError> {
    info!("开始检测，图像大小: {} 字节", image_bytes.len());
    let bytes = image_bytes.to_vec();
    let image = spawn_blocking(move || image::load_from_memory(&bytes).map(|image| image.to_rgb8()))
      .await?
      .map_err(NormalizeError::Decode)?;

    let now = Instant::now();
    let output = match timeout(self.detect_timeout, self.detector.detect(image_bytes)).await {
      Ok(output) => output?,
      Err(_) => {
        warn!("检测服务超时: {:?}", self.detect_timeout);
        return Err(DetectorError::Timeout(self.detect_timeout).into());
      }
    };
    info!(
      "检测服务返回 {} 个目标，耗时: {:.2?}",
      output.objects.len(),
      now.elapsed()
    );

    let normalizer = Arc::clone(&self.normalizer);
    let result = spawn_blocking(move || normalizer.normalize_image(image, &output)).await??;
    Ok(result)
  }
}

/// 构建上下文前对检测记录的排序方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextOrder {
  /// 保持检测器输出顺序
  #[default]
  Input,
  Confidence,
  Class,
}

/// 由检测记录构建上下文并提问
pub struct AskTask<A> {
  builder: ContextBuilder,
  orchestrator: Orchestrator<A>,
}

impl<A: Answerer> AskTask<A> {
  pub fn new(builder: ContextBuilder, orchestrator: Orchestrator<A>) -> Self {
    Self {
      builder,
      orchestrator,
    }
  }

  pub fn orchestrator(&self) -> &Orchestrator<A> {
    &self.orchestrator
  }

  pub async fn run(
    &self,
    question: &str,
    detections: &[DetectionRecord],
    order: ContextOrder,
    history: &[QaExchange],
  ) -> Result<QaExchange, QaError> {
    let context = match order {
      ContextOrder::Input => self.builder.build(detections),
      ContextOrder::Confidence => {
        let mut sorted = detections.to_vec();
        sort_by_confidence(&mut sorted);
        self.builder.build(&sorted)
      }
      ContextOrder::Class => {
        let mut sorted = detections.to_vec();
        sort_by_class(&mut sorted);
        self.builder.build(&sorted)
      }
    };
    self.orchestrator.answer(question, &context, history).await
  }
}
