//! 检测状态 (StatusStore)
//!
//! 进程内唯一的状态快照. 所有修改都通过 `replace` / `update_if` 在写锁内一次完成,
//! 读者只会看到完整的快照.

pub mod history;

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::events::EventKind;

pub use history::{AlertSummary, EventHistory};

/// 状态快照
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub accident_detected: bool,
    pub fire_detected: bool,
    pub last_event: Option<EventKind>,
    /// 相对证据根目录
    pub last_image_path: Option<String>,
    pub location: Option<String>,
    pub alert_sent: bool,
    pub camera_connected: bool,
}

/// 字段级合并更新, `None` 表示保持原值
#[derive(Clone, Debug, Default)]
pub struct StatusUpdate {
    accident_detected: Option<bool>,
    fire_detected: Option<bool>,
    last_event: Option<Option<EventKind>>,
    last_image_path: Option<Option<String>>,
    location: Option<Option<String>>,
    alert_sent: Option<bool>,
    camera_connected: Option<bool>,
}

impl StatusUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accident_detected(mut self, value: bool) -> Self {
        self.accident_detected = Some(value);
        self
    }

    pub fn fire_detected(mut self, value: bool) -> Self {
        self.fire_detected = Some(value);
        self
    }

    pub fn last_event(mut self, value: Option<EventKind>) -> Self {
        self.last_event = Some(value);
        self
    }

    pub fn last_image_path(mut self, value: Option<String>) -> Self {
        self.last_image_path = Some(value);
        self
    }

    pub fn location(mut self, value: Option<String>) -> Self {
        self.location = Some(value);
        self
    }

    pub fn alert_sent(mut self, value: bool) -> Self {
        self.alert_sent = Some(value);
        self
    }

    pub fn camera_connected(mut self, value: bool) -> Self {
        self.camera_connected = Some(value);
        self
    }

    fn apply(self, status: &mut Status) {
        if let Some(v) = self.accident_detected {
            status.accident_detected = v;
        }
        if let Some(v) = self.fire_detected {
            status.fire_detected = v;
        }
        if let Some(v) = self.last_event {
            status.last_event = v;
        }
        if let Some(v) = self.last_image_path {
            status.last_image_path = v;
        }
        if let Some(v) = self.location {
            status.location = v;
        }
        if let Some(v) = self.alert_sent {
            status.alert_sent = v;
        }
        if let Some(v) = self.camera_connected {
            status.camera_connected = v;
        }
    }
}

/// 状态变化观察者, 在写锁释放后调用
pub trait StatusObserver: Send + Sync {
    fn on_change(&self, previous: &Status, current: &Status);
}

#[derive(Default)]
pub struct StatusStore {
    inner: RwLock<Status>,
    observers: RwLock<Vec<Arc<dyn StatusObserver>>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn StatusObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// 当前快照
    pub fn read(&self) -> Status {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// 原子合并, 返回新快照
    pub fn replace(&self, update: StatusUpdate) -> Status {
        let (previous, current) = {
            let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            let previous = guard.clone();
            update.apply(&mut guard);
            (previous, guard.clone())
        };
        self.notify(&previous, &current);
        current
    }

    /// 仅当 `predicate` 对当前快照成立时合并, 判断与写入在同一把锁内
    pub fn update_if<F>(&self, predicate: F, update: StatusUpdate) -> bool
    where
        F: FnOnce(&Status) -> bool,
    {
        let (previous, current) = {
            let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            if !predicate(&guard) {
                return false;
            }
            let previous = guard.clone();
            update.apply(&mut guard);
            (previous, guard.clone())
        };
        self.notify(&previous, &current);
        true
    }

    fn notify(&self, previous: &Status, current: &Status) {
        if previous == current {
            return;
        }
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer.on_change(previous, current);
        }
    }
}

/// 把状态变化写入日志
pub struct LoggingObserver;

impl StatusObserver for LoggingObserver {
    fn on_change(&self, previous: &Status, current: &Status) {
        if current.last_image_path != previous.last_image_path {
            if let Some(path) = &current.last_image_path {
                warn!(
                    "🚨 {} | 事故={} 火情={} | 证据={} | 位置={}",
                    current.last_event.map(|k| k.label()).unwrap_or("-"),
                    current.accident_detected,
                    current.fire_detected,
                    path,
                    current.location.as_deref().unwrap_or("-")
                );
            }
        }
        if current.alert_sent && !previous.alert_sent {
            info!("✅ 告警已发送: {}", current.last_image_path.as_deref().unwrap_or("-"));
        }
        if current.camera_connected != previous.camera_connected {
            if current.camera_connected {
                info!("✅ 摄像头已连接");
            } else {
                info!("📷 摄像头已断开");
            }
        }
    }
}
