// 该文件是 Jianwen （见闻） 项目的一部分。
// src/output.rs - 保存检测结果
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

use std::path::{Path, PathBuf};

use image::ImageFormat;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, model::DetectionResult};

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: 期望 'image', 实际 '{0}'")]
  SchemeMismatch(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 保存标注图像到 `image://<path>`，可选地在同名 `.json` 文件中记录检测结果
pub struct SaveImageFileOutput {
  path: PathBuf,
  record: bool,
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(url.scheme().to_string()));
    }

    let record = url
      .query_pairs()
      .any(|(key, value)| key == "record" && value != "false");

    Ok(SaveImageFileOutput {
      path: PathBuf::from(url.path()),
      record,
    })
  }
}

impl SaveImageFileOutput {
  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn save(&self, result: &DetectionResult) -> Result<(), SaveImageFileError> {
    let format = ImageFormat::from_path(&self.path)?;
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    // 标注图像已编码为 PNG，其他格式按扩展名重新编码
    if format == ImageFormat::Png {
      std::fs::write(&self.path, result.annotated_image())?;
    } else {
      image::load_from_memory_with_format(result.annotated_image(), ImageFormat::Png)?
        .save_with_format(&self.path, format)?;
    }
    info!("保存标注图像到文件: {}", self.path.display());

    if self.record {
      let record_path = self.path.with_extension("json");
      let records = serde_json::to_vec_pretty(result.detections())?;
      std::fs::write(&record_path, records)?;
      info!("保存检测记录到文件: {}", record_path.display());
    }

    Ok(())
  }
}
