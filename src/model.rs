// 该文件是 Jianwen （见闻） 项目的一部分。
// src/model.rs - 检测记录模型与检测器接口
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
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod labels;
pub use self::labels::{COCO_LABELS, LabelVocabulary, LabelVocabularyError};

#[cfg(feature = "http_detector")]
mod http_detector;
#[cfg(feature = "http_detector")]
pub use self::http_detector::{HttpDetector, HttpDetectorBuilder, HttpDetectorError};

/// 像素坐标系下的边界框 [x1, y1, x2, y2]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
}

impl BoundingBox {
  pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self { x1, y1, x2, y2 }
  }

  pub fn width(&self) -> f32 {
    self.x2 - self.x1
  }

  pub fn height(&self) -> f32 {
    self.y2 - self.y1
  }

  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }

  pub fn is_finite(&self) -> bool {
    self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
  }

  /// 坐标有限、非负、有序且面积为正
  pub fn is_well_formed(&self) -> bool {
    self.is_finite() && self.x1 >= 0.0 && self.y1 >= 0.0 && self.width() > 0.0 && self.height() > 0.0
  }

  pub fn as_array(&self) -> [f32; 4] {
    [self.x1, self.y1, self.x2, self.y2]
  }
}

/// 单条记录的校验错误，归一化时计数并丢弃，不会导致整个请求失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
  #[error("未知类别索引: {class_id}")]
  UnknownClass { class_id: i64 },
  #[error("退化的边界框: {bbox:?}")]
  DegenerateBox { bbox: [f64; 4] },
  #[error("置信度超出 [0, 1] 范围: {score}")]
  InvalidConfidence { score: f64 },
  #[error("类别名称为空")]
  EmptyClassName,
}

/// 一个被检测到的目标，创建后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedRecord")]
pub struct DetectionRecord {
  class_name: String,
  confidence: f32,
  bounding_box: BoundingBox,
}

#[derive(Deserialize)]
struct UncheckedRecord {
  class_name: String,
  confidence: f32,
  bounding_box: BoundingBox,
}

impl TryFrom<UncheckedRecord> for DetectionRecord {
  type Error = RecordError;

  fn try_from(raw: UncheckedRecord) -> Result<Self, Self::Error> {
    DetectionRecord::new(raw.class_name, raw.confidence, raw.bounding_box)
  }
}

impl DetectionRecord {
  /// 校验类别名称、置信度与边界框后创建记录
  pub fn new(
    class_name: impl Into<String>,
    confidence: f32,
    bounding_box: BoundingBox,
  ) -> Result<Self, RecordError> {
    let class_name = class_name.into();
    if class_name.trim().is_empty() {
      return Err(RecordError::EmptyClassName);
    }
    if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
      return Err(RecordError::InvalidConfidence {
        score: confidence as f64,
      });
    }
    if !bounding_box.is_well_formed() {
      return Err(RecordError::DegenerateBox {
        bbox: bounding_box.as_array().map(f64::from),
      });
    }
    Ok(Self {
      class_name,
      confidence,
      bounding_box,
    })
  }

  pub fn class_name(&self) -> &str {
    &self.class_name
  }

  pub fn confidence(&self) -> f32 {
    self.confidence
  }

  pub fn bounding_box(&self) -> &BoundingBox {
    &self.bounding_box
  }
}

/// 按置信度从高到低排序，置信度相同的记录保持原有顺序
pub fn sort_by_confidence(records: &mut [DetectionRecord]) {
  records.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

/// 按类别名称排序，同类记录保持原有顺序
pub fn sort_by_class(records: &mut [DetectionRecord]) {
  records.sort_by(|a, b| a.class_name.cmp(&b.class_name));
}

/// 归一化过程中被丢弃的记录数量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCounts {
  pub unknown_class: usize,
  pub degenerate_box: usize,
  pub invalid_confidence: usize,
}

impl DropCounts {
  pub fn record(&mut self, err: &RecordError) {
    match err {
      RecordError::UnknownClass { .. } | RecordError::EmptyClassName => self.unknown_class += 1,
      RecordError::DegenerateBox { .. } => self.degenerate_box += 1,
      RecordError::InvalidConfidence { .. } => self.invalid_confidence += 1,
    }
  }

  pub fn total(&self) -> usize {
    self.unknown_class + self.degenerate_box + self.invalid_confidence
  }
}

/// 一次检测请求的结果
#[derive(Debug, Clone)]
pub struct DetectionResult {
  detections: Box<[DetectionRecord]>,
  annotated_image: Box<[u8]>,
  processing_time: Duration,
  dropped: DropCounts,
}

impl DetectionResult {
  pub(crate) fn new(
    detections: Vec<DetectionRecord>,
    annotated_image: Vec<u8>,
    processing_time: Duration,
    dropped: DropCounts,
  ) -> Self {
    Self {
      detections: detections.into_boxed_slice(),
      annotated_image: annotated_image.into_boxed_slice(),
      processing_time,
      dropped,
    }
  }

  pub fn detections(&self) -> &[DetectionRecord] {
    &self.detections
  }

  /// PNG 编码的标注图像
  pub fn annotated_image(&self) -> &[u8] {
    &self.annotated_image
  }

  pub fn processing_time(&self) -> Duration {
    self.processing_time
  }

  pub fn dropped(&self) -> DropCounts {
    self.dropped
  }
}

/// 一轮问答
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaExchange {
  pub question: String,
  pub answer: String,
  #[serde(with = "duration_secs")]
  pub processing_time: Duration,
}

/// 检测器输出坐标所在的坐标系
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoordinateSpace {
  /// 原图像素坐标
  #[default]
  Pixels,
  /// 相对原图宽高的 [0, 1] 坐标
  Normalized,
  /// 模型输入尺寸下的像素坐标，按比例缩放回原图
  Model { width: f64, height: f64 },
}

/// 检测器输出的单个目标，尚未校验
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObject {
  pub class_id: i64,
  pub score: f64,
  pub bbox: [f64; 4], // [x_min, y_min, x_max, y_max]
}

/// 检测器的原始输出，顺序即检测器的输出顺序
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDetectorOutput {
  #[serde(default)]
  pub coordinates: CoordinateSpace,
  #[serde(default)]
  pub objects: Vec<RawObject>,
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("检测服务不可用: {0}")]
  Unavailable(String),
  #[error("检测服务响应格式错误: {0}")]
  Malformed(String),
  #[error("检测服务超时: {0:?}")]
  Timeout(Duration),
}

/// 外部目标检测器
#[async_trait]
pub trait Detector: Send + Sync {
  async fn detect(&self, image: &[u8]) -> Result<RawDetectorOutput, DetectorError>;
}

#[async_trait]
impl<T: Detector + ?Sized> Detector for Arc<T> {
  async fn detect(&self, image: &[u8]) -> Result<RawDetectorOutput, DetectorError> {
    (**self).detect(image).await
  }
}

/// 以秒（浮点数）序列化 Duration
pub(crate) mod duration_secs {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer, Serializer, de::Error};

  pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
  }
}
