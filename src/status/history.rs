//! 事件历史 (环形缓冲) 与告警计数

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::events::{Event, EventKind};

pub const DEFAULT_CAPACITY: usize = 100;

/// `GET /api/alerts` 返回的汇总
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSummary {
    pub latest_alert: Option<Event>,
    pub accident_count: u64,
    pub fire_count: u64,
}

struct HistoryInner {
    events: VecDeque<Event>,
    capacity: usize,
    accident_count: u64,
    fire_count: u64,
}

pub struct EventHistory {
    inner: Mutex<HistoryInner>,
}

impl EventHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(HistoryInner {
                events: VecDeque::with_capacity(capacity),
                capacity,
                accident_count: 0,
                fire_count: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).capacity
    }

    pub fn record(&self, event: Event) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match event.kind {
            EventKind::Collision => inner.accident_count += 1,
            EventKind::Fire => inner.fire_count += 1,
        }
        if inner.events.len() >= inner.capacity {
            inner.events.pop_front();
        }
        inner.events.push_back(event);
    }

    /// 最近的事件, 新的在前
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.events.iter().rev().take(limit).cloned().collect()
    }

    /// 计数为进程启动以来的累计值, 不受缓冲容量影响
    pub fn summary(&self) -> AlertSummary {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        AlertSummary {
            latest_alert: inner.events.back().cloned(),
            accident_count: inner.accident_count,
            fire_count: inner.fire_count,
        }
    }
}

impl Default for EventHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
