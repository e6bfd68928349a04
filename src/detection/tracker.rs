// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 多目标跟踪公共组件
//! Common components for multi-object tracking

use super::types::{BBox, Detection, Frame, Track};
use crate::error::Result;

// ========== 跟踪器统一接口 ==========

/// 多目标跟踪器 Trait
///
/// 跟踪器跨帧维护身份, 流水线只读取返回的 Track.
pub trait Tracker: Send {
    /// 更新跟踪器
    ///
    /// # 参数
    /// - `detections`: 当前帧的车辆检测框
    /// - `frame`: 当前帧 (外观特征类跟踪器可用)
    ///
    /// # 返回
    /// 当前帧中活跃的跟踪对象
    fn update(&mut self, detections: &[Detection], frame: &Frame) -> Result<Vec<Track>>;

    /// 重置跟踪器 (清除所有跟踪)
    fn reset(&mut self);

    /// 获取当前跟踪数量
    fn track_count(&self) -> usize;
}

// ========== 卡尔曼滤波器 ==========

/// 简化卡尔曼滤波器 (对角协方差)
/// 状态向量: [cx, cy, w, h, vx, vy, vw, vh]
#[derive(Clone, Debug)]
pub struct KalmanBoxFilter {
    state: [f32; 8],
    p: [f32; 8],
    /// 过程噪声
    q: f32,
    /// 观测噪声
    r: f32,
    /// 每帧速度保留比例
    velocity_decay: f32,
}

impl KalmanBoxFilter {
    /// - `q`: 过程噪声 (越小越平滑)
    /// - `r`: 观测噪声 (越大越信任预测)
    pub fn new(bbox: &BBox, q: f32, r: f32) -> Self {
        let (cx, cy) = bbox.center();
        Self {
            state: [cx, cy, bbox.width(), bbox.height(), 0.0, 0.0, 0.0, 0.0],
            p: [10.0; 8],
            q,
            r,
            velocity_decay: 0.95,
        }
    }

    /// 匀速模型预测一帧
    pub fn predict(&mut self) {
        for i in 4..8 {
            self.state[i] *= self.velocity_decay;
        }
        for i in 0..4 {
            self.state[i] += self.state[i + 4];
        }
        for p in self.p.iter_mut() {
            *p += self.q;
        }
    }

    /// 融合观测
    pub fn update(&mut self, bbox: &BBox) {
        let (cx, cy) = bbox.center();
        let residual = [
            cx - self.state[0],
            cy - self.state[1],
            bbox.width() - self.state[2],
            bbox.height() - self.state[3],
        ];

        for i in 0..4 {
            let k = self.p[i] / (self.p[i] + self.r);
            let kv = self.p[i + 4] / (self.p[i + 4] + self.r * 10.0);
            self.state[i] += k * residual[i];
            self.state[i + 4] += kv * residual[i];
            self.p[i] *= 1.0 - k;
            self.p[i + 4] *= 1.0 - kv;
        }
    }

    /// 当前状态对应的边界框
    pub fn bbox(&self) -> BBox {
        Self::to_bbox(self.state[0], self.state[1], self.state[2], self.state[3])
    }

    fn to_bbox(cx: f32, cy: f32, w: f32, h: f32) -> BBox {
        let w = w.max(1.0);
        let h = h.max(1.0);
        BBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }
}
