// 该文件是 Jianwen （见闻） 项目的一部分。
// src/model/labels.rs - 类别标签词表
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

use thiserror::Error;
use tracing::{debug, info};

/// COCO 数据集类别名称
pub const COCO_LABELS: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

#[derive(Error, Debug)]
pub enum LabelVocabularyError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签词表为空")]
  Empty,
  #[error("第 {0} 行标签为空")]
  BlankLabel(usize),
}

/// 检测器类别索引到类别名称的固定映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVocabulary {
  names: Box<[String]>,
}

impl Default for LabelVocabulary {
  fn default() -> Self {
    Self::coco()
  }
}

impl LabelVocabulary {
  pub fn coco() -> Self {
    Self {
      names: COCO_LABELS.iter().map(|name| name.to_string()).collect(),
    }
  }

  pub fn from_names<I, S>(names: I) -> Result<Self, LabelVocabularyError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let names: Box<[String]> = names.into_iter().map(Into::into).collect();
    if names.is_empty() {
      return Err(LabelVocabularyError::Empty);
    }
    if let Some(idx) = names.iter().position(|name| name.trim().is_empty()) {
      return Err(LabelVocabularyError::BlankLabel(idx + 1));
    }
    Ok(Self { names })
  }

  /// 读取每行一个类别名称的标签文件，忽略末尾空行
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelVocabularyError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let lines: Vec<&str> = content.trim_end().lines().map(str::trim).collect();
    let vocabulary = Self::from_names(lines)?;
    debug!("标签数量: {}", vocabulary.len());
    Ok(vocabulary)
  }

  pub fn name(&self, class_id: i64) -> Option<&str> {
    usize::try_from(class_id)
      .ok()
      .and_then(|idx| self.names.get(idx))
      .map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}
