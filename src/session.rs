// 该文件是 Jianwen （见闻） 项目的一部分。
// src/session.rs - 会话与对话历史
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

use std::{collections::VecDeque, sync::Arc};

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::{
  answer::HistoryPolicy,
  model::{DetectionRecord, QaExchange},
};

/// 会话当前持有的检测结果标识，每次新检测都会更换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Generation(Uuid);

impl Generation {
  fn next() -> Self {
    Generation(Uuid::new_v4())
  }
}

impl std::fmt::Display for Generation {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    std::fmt::Display::fmt(&self.0, f)
  }
}

struct Session {
  generation: Generation,
  detections: Arc<[DetectionRecord]>,
  history: VecDeque<QaExchange>,
}

/// 会话在某一时刻的只读副本
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
  pub generation: Generation,
  pub detections: Arc<[DetectionRecord]>,
  pub history: Vec<QaExchange>,
}

/// 以调用方标识为键的会话表
///
/// 新的检测会替换旧的检测结果并清空历史；问答结果只有在会话仍然持有
/// 同一次检测时才会写入历史。
pub struct SessionStore {
  sessions: DashMap<String, Session>,
  history: HistoryPolicy,
}

impl SessionStore {
  pub fn new(history: HistoryPolicy) -> Self {
    Self {
      sessions: DashMap::new(),
      history,
    }
  }

  pub fn begin_detection(&self, key: &str, detections: Vec<DetectionRecord>) -> Generation {
    let generation = Generation::next();
    debug!("会话 {} 开始新的检测 {}", key, generation);
    self.sessions.insert(
      key.to_string(),
      Session {
        generation,
        detections: detections.into(),
        history: VecDeque::new(),
      },
    );
    generation
  }

  pub fn snapshot(&self, key: &str) -> Option<SessionSnapshot> {
    self.sessions.get(key).map(|session| SessionSnapshot {
      generation: session.generation,
      detections: Arc::clone(&session.detections),
      history: session.history.iter().cloned().collect(),
    })
  }

  /// 会话已切换到其他检测时丢弃该问答并返回 false
  pub fn record_exchange(&self, key: &str, generation: Generation, exchange: QaExchange) -> bool {
    let Some(mut session) = self.sessions.get_mut(key) else {
      debug!("会话 {} 不存在，丢弃问答", key);
      return false;
    };
    if session.generation != generation {
      debug!(
        "会话 {} 已切换到检测 {}，丢弃属于 {} 的问答",
        key, session.generation, generation
      );
      return false;
    }

    session.history.push_back(exchange);
    while session.history.len() > self.history.max_turns {
      session.history.pop_front();
    }
    true
  }

  pub fn end(&self, key: &str) -> bool {
    self.sessions.remove(key).is_some()
  }

  pub fn len(&self) -> usize {
    self.sessions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sessions.is_empty()
  }
}

impl Default for SessionStore {
  fn default() -> Self {
    Self::new(HistoryPolicy::default())
  }
}
