// 该文件是 Jianwen （见闻） 项目的一部分。
// src/server/config.rs - 服务配置
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

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// HTTP 服务配置
#[derive(Debug, Clone)]
pub struct ServerConfig {
  pub host: String,
  pub port: u16,
  /// 允许的跨域来源，包含 `*` 时允许任意来源
  pub cors_origins: Vec<String>,
  /// 校验 HS256 访问令牌的密钥，令牌由外部签发
  pub jwt_secret: String,
  pub max_upload_bytes: usize,
}

impl ServerConfig {
  pub fn allows_any_origin(&self) -> bool {
    self.cors_origins.is_empty() || self.cors_origins.iter().any(|origin| origin == "*")
  }
}
