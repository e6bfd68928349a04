/// 事件判定系统 (Event Evaluation)
///
/// - collision: 轨迹框 IoU 碰撞判定
/// - fire:      HSV 火焰颜色区域判定
/// - annotate:  事件框/标签绘制
/// - cooldown:  同类事件冷却
pub mod annotate;
pub mod collision;
pub mod cooldown;
pub mod evaluator;
pub mod fire;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::detection::BBox;

pub use collision::{check_collision, iou, CollisionHit};
pub use cooldown::CooldownGate;
pub use evaluator::{EvaluatorConfig, EventEvaluator, FrameFindings};
pub use fire::{detect_fire, FireConfig, FireHit};

/// 事件类型, 序列化为面向用户的标签
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "Accident")]
    Collision,
    #[serde(rename = "Car on Fire")]
    Fire,
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Collision => "Accident",
            EventKind::Fire => "Car on Fire",
        }
    }

    /// 证据目录名
    pub fn folder(&self) -> &'static str {
        match self {
            EventKind::Collision => "accident_frames",
            EventKind::Fire => "fire_frames",
        }
    }

    /// 证据文件名前缀
    pub fn file_prefix(&self) -> &'static str {
        match self {
            EventKind::Collision => "accident",
            EventKind::Fire => "fire",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// 事件 (创建后不可变, 按值交给告警线程)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: u64,
    pub kind: EventKind,
    pub bounding_region: BBox,
    pub timestamp: DateTime<Local>,
    /// 相对证据根目录的路径, 如 `accident_frames/accident_20240101_120000_7.jpg`
    pub image_path: String,
    pub location: Option<String>,
}

impl Event {
    pub fn new(
        id: u64,
        kind: EventKind,
        bounding_region: BBox,
        timestamp: DateTime<Local>,
        location: Option<String>,
    ) -> Self {
        Self {
            id,
            kind,
            bounding_region,
            timestamp,
            image_path: evidence_path(kind, &timestamp, id),
            location,
        }
    }
}

/// `<目录>/<前缀>_YYYYMMDD_HHMMSS_<id>.jpg`
///
/// 冷却为 0 时同一秒内可能有多个同类事件, 后缀 id 保证路径唯一
pub fn evidence_path(kind: EventKind, timestamp: &DateTime<Local>, id: u64) -> String {
    format!(
        "{}/{}_{}_{}.jpg",
        kind.folder(),
        kind.file_prefix(),
        crate::gen_time_string(timestamp),
        id
    )
}
