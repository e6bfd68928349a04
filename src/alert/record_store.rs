//! 事件持久化记录

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SentinelError};
use crate::events::EventKind;

/// 一条事件记录 (event_type, location, image_path, timestamp)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: EventKind,
    pub location: String,
    pub image_path: String,
    pub timestamp: DateTime<Local>,
}

pub trait RecordStore: Send + Sync {
    fn insert(&self, record: &EventRecord) -> Result<()>;
}

/// 追加写 JSON Lines 文件, 每行一条记录
pub struct JsonlRecordStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取全部记录 (跳过损坏行)
    pub fn load(&self) -> Result<Vec<EventRecord>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(text
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

impl RecordStore for JsonlRecordStore {
    fn insert(&self, record: &EventRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| SentinelError::PersistFailure(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| SentinelError::PersistFailure(format!("{}: {e}", parent.display())))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SentinelError::PersistFailure(format!("{}: {e}", self.path.display())))?;
        file.write_all(line.as_bytes())
            .map_err(|e| SentinelError::PersistFailure(e.to_string()))
    }
}
