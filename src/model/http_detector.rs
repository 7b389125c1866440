// 该文件是 Jianwen （见闻） 项目的一部分。
// src/model/http_detector.rs - 基于 HTTP 的外部检测服务
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

use async_trait::async_trait;
use reqwest::{Client, header::CONTENT_TYPE};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl,
  model::{Detector, DetectorError, RawDetectorOutput},
};

const HTTP_DETECTOR_SCHEMES: [&str; 2] = ["http", "https"];
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;

#[derive(Error, Debug)]
pub enum HttpDetectorError {
  #[error("检测服务地址必须使用 http 或 https 方案, 实际为 '{0}'")]
  SchemeMismatch(String),
  #[error("置信度阈值无效: {0}")]
  InvalidThreshold(f32),
  #[error("HTTP 客户端创建失败: {0}")]
  ClientError(#[from] reqwest::Error),
}

/// 将原始图像字节 POST 给检测服务，服务返回 JSON 格式的 [`RawDetectorOutput`]
pub struct HttpDetector {
  endpoint: Url,
  client: Client,
}

pub struct HttpDetectorBuilder {
  endpoint: Url,
  confidence_threshold: f32,
}

impl FromUrl for HttpDetectorBuilder {
  type Error = HttpDetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if !HTTP_DETECTOR_SCHEMES.contains(&url.scheme()) {
      return Err(HttpDetectorError::SchemeMismatch(url.scheme().to_string()));
    }

    Ok(HttpDetectorBuilder {
      endpoint: url.clone(),
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
    })
  }
}

impl HttpDetectorBuilder {
  pub fn confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn build(self) -> Result<HttpDetector, HttpDetectorError> {
    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      return Err(HttpDetectorError::InvalidThreshold(self.confidence_threshold));
    }

    let mut endpoint = self.endpoint;
    endpoint
      .query_pairs_mut()
      .append_pair("conf", &self.confidence_threshold.to_string());

    info!("检测服务地址: {}", endpoint);
    let client = Client::builder().build()?;
    Ok(HttpDetector { endpoint, client })
  }
}

#[async_trait]
impl Detector for HttpDetector {
  async fn detect(&self, image: &[u8]) -> Result<RawDetectorOutput, DetectorError> {
    debug!("发送检测请求, 图像大小: {} 字节", image.len());
    let resp = self
      .client
      .post(self.endpoint.clone())
      .header(CONTENT_TYPE, "application/octet-stream")
      .body(image.to_vec())
      .send()
      .await
      .map_err(|e| {
        error!("检测服务请求失败: {}", e);
        DetectorError::Unavailable(e.to_string())
      })?;

    let status = resp.status();
    if !status.is_success() {
      let text = resp
        .text()
        .await
        .unwrap_or_else(|_| "<响应体不可用>".to_string());
      error!("检测服务返回 {}: {}", status, text);
      return Err(if status.is_server_error() {
        DetectorError::Unavailable(format!("{}: {}", status, text))
      } else {
        DetectorError::Malformed(format!("{}: {}", status, text))
      });
    }

    let body = resp
      .bytes()
      .await
      .map_err(|e| DetectorError::Unavailable(e.to_string()))?;
    let output: RawDetectorOutput =
      serde_json::from_slice(&body).map_err(|e| DetectorError::Malformed(e.to_string()))?;
    debug!("检测服务返回 {} 个目标", output.objects.len());
    Ok(output)
  }
}
