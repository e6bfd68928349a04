#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod alert; // 告警分发 (证据/位置/通知/记录)
pub mod config; // 命令行参数
pub mod detection; // 检测与跟踪
pub mod error;
pub mod events; // 碰撞/火情判定
pub mod input; // 视频输入系统
pub mod pipeline; // 采集流水线与启停控制
pub mod status; // 状态快照与事件历史
pub mod stream; // MJPEG 推流
pub mod web_api; // HTTP 接口

#[cfg(test)]
pub(crate) mod testkit;

use chrono::{DateTime, Local};

pub use crate::config::Args;
pub use crate::error::{Result, SentinelError};
pub use crate::pipeline::{Pipeline, PipelineState};
pub use crate::status::{Status, StatusStore};

/// 证据文件名中的时间戳, 如 `20240309_070501`
pub fn gen_time_string(t: &DateTime<Local>) -> String {
    t.format("%Y%m%d_%H%M%S").to_string()
}
