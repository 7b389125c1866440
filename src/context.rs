// 该文件是 Jianwen （见闻） 项目的一部分。
// src/context.rs - 问答上下文构建
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

use std::collections::BTreeMap;

use tracing::debug;

use crate::model::DetectionRecord;

pub const DEFAULT_MAX_DETECTIONS: usize = 200;

const NO_OBJECTS: &str = "No objects were detected in the image.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextPolicy {
  /// 上下文中最多列出的检测记录数
  pub max_detections: usize,
}

impl Default for ContextPolicy {
  fn default() -> Self {
    Self {
      max_detections: DEFAULT_MAX_DETECTIONS,
    }
  }
}

/// 由检测记录生成的只读文本上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaContext {
  text: String,
  included: usize,
  omitted: usize,
}

impl QaContext {
  pub fn text(&self) -> &str {
    &self.text
  }

  pub fn included(&self) -> usize {
    self.included
  }

  pub fn omitted(&self) -> usize {
    self.omitted
  }
}

#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
  policy: ContextPolicy,
}

impl ContextBuilder {
  pub fn new(policy: ContextPolicy) -> Self {
    Self { policy }
  }

  pub fn policy(&self) -> ContextPolicy {
    self.policy
  }

  /// 按输入顺序逐行列出检测记录，不改变顺序；超出上限时保留置信度最高的记录
  pub fn build(&self, detections: &[DetectionRecord]) -> QaContext {
    if detections.is_empty() {
      return QaContext {
        text: NO_OBJECTS.to_string(),
        included: 0,
        omitted: 0,
      };
    }

    let kept = self.select(detections);
    let omitted = detections.len() - kept.len();

    let mut class_counts = BTreeMap::new();
    for record in detections {
      *class_counts.entry(record.class_name()).or_insert(0usize) += 1;
    }

    let mut lines = vec![
      "Detection Results:".to_string(),
      format!("Total objects detected: {}", detections.len()),
      "Object Summary:".to_string(),
    ];
    lines.extend(
      class_counts
        .iter()
        .map(|(class_name, count)| format!("- {}: {}", class_name, count)),
    );
    lines.push("Detailed Detection Data:".to_string());
    for &idx in &kept {
      let record = &detections[idx];
      let bbox = record.bounding_box();
      lines.push(format!(
        "{}. {} (confidence: {:.3}, location: x1={:.1}, y1={:.1}, x2={:.1}, y2={:.1})",
        idx + 1,
        record.class_name(),
        record.confidence(),
        bbox.x1,
        bbox.y1,
        bbox.x2,
        bbox.y2
      ));
    }
    if omitted > 0 {
      lines.push(format!("{} additional detections omitted", omitted));
    }

    debug!("上下文构建完成: 列出 {} 条, 省略 {} 条", kept.len(), omitted);

    QaContext {
      text: lines.join("\n"),
      included: kept.len(),
      omitted,
    }
  }

  /// 返回保留记录的下标（升序）
  fn select(&self, detections: &[DetectionRecord]) -> Vec<usize> {
    let cap = self.policy.max_detections;
    if detections.len() <= cap {
      return (0..detections.len()).collect();
    }

    let mut ranked: Vec<usize> = (0..detections.len()).collect();
    ranked.sort_by(|&a, &b| {
      detections[b]
        .confidence()
        .total_cmp(&detections[a].confidence())
        .then(a.cmp(&b))
    });
    ranked.truncate(cap);
    ranked.sort_unstable();
    ranked
  }
}
