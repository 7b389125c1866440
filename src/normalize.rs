// 该文件是 Jianwen （见闻） 项目的一部分。
// src/normalize.rs - 检测结果归一化
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

use std::{io::Cursor, time::Instant};

use image::{DynamicImage, ImageFormat, RgbImage};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{
  BoundingBox, CoordinateSpace, DetectionRecord, DetectionResult, DropCounts, LabelVocabulary,
  RawDetectorOutput, RawObject, RecordError,
};

pub mod draw;
use self::draw::Draw;

#[derive(Error, Debug)]
pub enum NormalizeError {
  #[error("图像解码错误: {0}")]
  Decode(image::ImageError),
  #[error("图像编码错误: {0}")]
  Encode(image::ImageError),
  #[error("模型输入尺寸无效: {width}x{height}")]
  InvalidModelSpace { width: f64, height: f64 },
}

/// 将检测器的原始输出转换为经过校验的检测记录，并生成标注图像
pub struct Normalizer {
  vocabulary: LabelVocabulary,
  draw: Draw,
}

impl Default for Normalizer {
  fn default() -> Self {
    Self::new(LabelVocabulary::coco(), Draw::default())
  }
}

impl Normalizer {
  pub fn new(vocabulary: LabelVocabulary, draw: Draw) -> Self {
    Self { vocabulary, draw }
  }

  pub fn vocabulary(&self) -> &LabelVocabulary {
    &self.vocabulary
  }

  /// 解码图像后开始计时，processing_time 不包含解码时间
  pub fn normalize(
    &self,
    image_bytes: &[u8],
    output: &RawDetectorOutput,
  ) -> Result<DetectionResult, NormalizeError> {
    let image = image::load_from_memory(image_bytes)
      .map_err(NormalizeError::Decode)?
      .to_rgb8();
    self.normalize_image(image, output)
  }

  pub fn normalize_image(
    &self,
    image: RgbImage,
    output: &RawDetectorOutput,
  ) -> Result<DetectionResult, NormalizeError> {
    let started = Instant::now();
    let (width, height) = (image.width() as f64, image.height() as f64);
    let (scale_x, scale_y) = coordinate_scale(output.coordinates, width, height)?;

    let mut dropped = DropCounts::default();
    let mut class_ids = Vec::with_capacity(output.objects.len());
    let mut detections = Vec::with_capacity(output.objects.len());

    for (idx, object) in output.objects.iter().enumerate() {
      match self.validate(object, scale_x, scale_y, width, height) {
        Ok((class_id, record)) => {
          class_ids.push(class_id);
          detections.push(record);
        }
        Err(e) => {
          debug!("丢弃第 {} 个目标: {}", idx, e);
          dropped.record(&e);
        }
      }
    }

    if dropped.total() > 0 {
      warn!(
        "丢弃 {} 个无效目标 (未知类别: {}, 退化边框: {}, 无效置信度: {})",
        dropped.total(),
        dropped.unknown_class,
        dropped.degenerate_box,
        dropped.invalid_confidence
      );
    }

    let mut annotated = image;
    self
      .draw
      .draw_detections(&mut annotated, class_ids.iter().copied().zip(detections.iter()));

    let mut encoded = Vec::new();
    DynamicImage::ImageRgb8(annotated)
      .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
      .map_err(NormalizeError::Encode)?;

    let processing_time = started.elapsed();
    info!(
      "归一化完成: 保留 {} 个目标，耗时 {:.2?}",
      detections.len(),
      processing_time
    );

    Ok(DetectionResult::new(
      detections,
      encoded,
      processing_time,
      dropped,
    ))
  }

  fn validate(
    &self,
    object: &RawObject,
    scale_x: f64,
    scale_y: f64,
    width: f64,
    height: f64,
  ) -> Result<(usize, DetectionRecord), RecordError> {
    let class_name = self
      .vocabulary
      .name(object.class_id)
      .ok_or(RecordError::UnknownClass {
        class_id: object.class_id,
      })?;

    if !object.score.is_finite() || !(0.0..=1.0).contains(&object.score) {
      return Err(RecordError::InvalidConfidence {
        score: object.score,
      });
    }

    let [x1, y1, x2, y2] = object.bbox;
    let degenerate = || RecordError::DegenerateBox { bbox: object.bbox };
    let scaled = [x1 * scale_x, y1 * scale_y, x2 * scale_x, y2 * scale_y];
    if scaled.iter().any(|v| !v.is_finite()) {
      return Err(degenerate());
    }

    let x1 = scaled[0].clamp(0.0, width);
    let y1 = scaled[1].clamp(0.0, height);
    let x2 = scaled[2].clamp(0.0, width);
    let y2 = scaled[3].clamp(0.0, height);
    if x2 <= x1 || y2 <= y1 {
      return Err(degenerate());
    }

    let bbox = BoundingBox::new(x1 as f32, y1 as f32, x2 as f32, y2 as f32);
    let record = DetectionRecord::new(class_name, object.score as f32, bbox)?;
    // 类别索引已在词表中查到，必然非负
    Ok((object.class_id as usize, record))
  }
}

/// 原始坐标到图像像素坐标的缩放比例
fn coordinate_scale(
  space: CoordinateSpace,
  width: f64,
  height: f64,
) -> Result<(f64, f64), NormalizeError> {
  match space {
    CoordinateSpace::Pixels => Ok((1.0, 1.0)),
    CoordinateSpace::Normalized => Ok((width, height)),
    CoordinateSpace::Model {
      width: model_w,
      height: model_h,
    } => {
      if !(model_w.is_finite() && model_h.is_finite() && model_w > 0.0 && model_h > 0.0) {
        return Err(NormalizeError::InvalidModelSpace {
          width: model_w,
          height: model_h,
        });
      }
      Ok((width / model_w, height / model_h))
    }
  }
}
