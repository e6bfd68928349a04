//! 碰撞判定: 任意两条不同轨迹的框 IoU 超过阈值即视为事故

use crate::detection::{BBox, Track};

/// 默认碰撞阈值 (严格大于)
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.4;

/// 命中的一对轨迹
#[derive(Clone, Debug, PartialEq)]
pub struct CollisionHit {
    pub first: Track,
    pub second: Track,
    pub iou: f32,
}

impl CollisionHit {
    /// 两框的外接矩形, 用于标注和事件区域
    pub fn region(&self) -> BBox {
        let a = &self.first.bbox;
        let b = &self.second.bbox;
        BBox::new(a.x1.min(b.x1), a.y1.min(b.y1), a.x2.max(b.x2), a.y2.max(b.y2))
    }
}

pub fn iou(a: &BBox, b: &BBox) -> f32 {
    a.iou(b)
}

/// 返回第一对 IoU > threshold 的轨迹, 没有则 None
pub fn check_collision(tracks: &[Track], threshold: f32) -> Option<CollisionHit> {
    for (i, first) in tracks.iter().enumerate() {
        for second in &tracks[i + 1..] {
            if first.id == second.id {
                continue;
            }
            let iou = first.bbox.iou(&second.bbox);
            if iou > threshold {
                return Some(CollisionHit {
                    first: first.clone(),
                    second: second.clone(),
                    iou,
                });
            }
        }
    }
    None
}
