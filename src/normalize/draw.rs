// 该文件是 Jianwen （见闻） 项目的一部分。
// src/normalize/draw.rs - 目标检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::info;

use crate::model::DetectionRecord;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_TEXT_COLOR: [u8; 3] = [255, 255, 255]; // 白色
const PALETTE_SIZE: usize = 80;
const BOX_THICKNESS: u32 = 2;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 在图像上绘制检测框，颜色由类别索引决定，同类目标颜色一致
pub struct Draw {
  font: Option<FontArc>,
  font_scale: PxScale,
  colors: Box<[Rgb<u8>]>,
}

impl Default for Draw {
  fn default() -> Self {
    // 生成 80 种不同的颜色（对应 COCO 数据集的 80 个类别）
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      font: None,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      colors,
    }
  }
}

impl Draw {
  /// 加载标签字体；未加载字体时只绘制边框
  pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let path = path.as_ref();
    info!("加载标签字体: {}", path.display());
    let data = std::fs::read(path)?;
    self.font = Some(FontArc::try_from_vec(data)?);
    Ok(self)
  }

  pub fn with_font_size(mut self, size: f32) -> Self {
    self.font_scale = PxScale::from(size);
    self
  }

  pub fn color_for(&self, class_id: usize) -> Rgb<u8> {
    self.colors[class_id % self.colors.len()]
  }

  /// 在图像上绘制检测结果，items 为 (类别索引, 记录)
  pub fn draw_detections<'r>(
    &self,
    image: &mut RgbImage,
    items: impl IntoIterator<Item = (usize, &'r DetectionRecord)>,
  ) {
    for (class_id, record) in items {
      self.draw_bbox_with_label(image, record, self.color_for(class_id));
    }
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, record: &DetectionRecord, color: Rgb<u8>) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }
    let bbox = record.bounding_box();

    let x_min = (bbox.x1.floor() as i32).clamp(0, w - 1);
    let y_min = (bbox.y1.floor() as i32).clamp(0, h - 1);
    let x_max = (bbox.x2.ceil() as i32 - 1).clamp(0, w - 1);
    let y_max = (bbox.y2.ceil() as i32 - 1).clamp(0, h - 1);

    if x_min > x_max || y_min > y_max {
      return;
    }

    // 绘制边框（加粗为 2 像素）
    for thickness in 0..BOX_THICKNESS as i32 {
      let width = x_max - x_min + 1 - 2 * thickness;
      let height = y_max - y_min + 1 - 2 * thickness;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + thickness, y_min + thickness).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    // 创建标签文本
    let label = format!("{} {:.2}", record.class_name(), record.confidence());
    let (text_width, text_height) = text_size(self.font_scale, font, &label);
    let text_height = text_height as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;

    // 标签背景位于边框上方，空间不足时贴着图像顶部
    let label_x = x_min;
    let label_y = (y_min - text_height).max(0);

    // 确保标签不超出图像边界
    let label_width = (text_width as i32).min(w - label_x);
    if label_width <= 0 || text_height <= 0 {
      return;
    }

    let rect = Rect::at(label_x, label_y).of_size(label_width as u32, text_height as u32);
    draw_filled_rect_mut(image, rect, color);
    draw_text_mut(
      image,
      Rgb(LABEL_TEXT_COLOR),
      label_x,
      label_y + LABEL_TEXT_VERTICAL_PADDING,
      self.font_scale,
      font,
      &label,
    );
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::BoundingBox;

  #[test]
  fn same_class_gets_same_color() {
    let draw = Draw::default();
    assert_eq!(draw.color_for(3), draw.color_for(3));
    assert_ne!(draw.color_for(0), draw.color_for(1));
    assert_eq!(draw.color_for(0), draw.color_for(PALETTE_SIZE));
  }

  #[test]
  fn draws_outline_inside_bounds() {
    let draw = Draw::default();
    let mut image = RgbImage::new(20, 20);
    let record = DetectionRecord::new("cat", 0.9, BoundingBox::new(2.0, 2.0, 10.0, 10.0)).unwrap();
    draw.draw_detections(&mut image, [(0, &record)]);

    let color = draw.color_for(0);
    assert_eq!(*image.get_pixel(2, 2), color);
    assert_eq!(*image.get_pixel(9, 9), color);
    assert_eq!(*image.get_pixel(3, 5), color);
    // 边框内部保持不变
    assert_eq!(*image.get_pixel(5, 5), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(15, 15), Rgb([0, 0, 0]));
  }

  #[test]
  fn box_touching_image_edge_is_clamped() {
    let draw = Draw::default();
    let mut image = RgbImage::new(8, 8);
    let record = DetectionRecord::new("cat", 0.9, BoundingBox::new(0.0, 0.0, 8.0, 8.0)).unwrap();
    draw.draw_detections(&mut image, [(5, &record)]);
    assert_eq!(*image.get_pixel(7, 7), draw.color_for(5));
  }
}
