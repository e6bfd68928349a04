/// 车辆检测系统数据结构定义
/// Data structures for the vehicle detection system
use chrono::{DateTime, Local};
use image::RgbImage;
use serde::{Deserialize, Serialize};

// ========== 公共常量 ==========

/// 推理输入尺寸
pub const INF_SIZE: u32 = 640;

/// 检测置信度下限
pub const MIN_CONFIDENCE: f32 = 0.5;

/// COCO 车辆类别白名单: 2=car, 3=motorcycle, 5=bus, 7=truck
pub static VEHICLE_CLASSES: phf::Map<u32, &'static str> = phf::phf_map! {
    2u32 => "car",
    3u32 => "motorcycle",
    5u32 => "bus",
    7u32 => "truck",
};

// ========== 数据结构 ==========

/// 检测框 (x1, y1, x2, y2), 像素坐标
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// 面积 (退化框为0)
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// 交并比 IoU = 交集 / (面积A + 面积B - 交集), 不重叠时交集为0
    pub fn iou(&self, other: &BBox) -> f32 {
        let iw = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let ih = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = iw * ih;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }

    /// 缩放到另一分辨率
    pub fn scale(&self, sx: f32, sy: f32) -> Self {
        Self {
            x1: self.x1 * sx,
            y1: self.y1 * sy,
            x2: self.x2 * sx,
            y2: self.y2 * sy,
        }
    }
}

/// 单帧检测结果 (每帧重新生成, 无身份)
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    pub fn is_vehicle(&self) -> bool {
        VEHICLE_CLASSES.contains_key(&self.class_id)
    }
}

/// 跟踪结果 (身份由跟踪器维护, 核心流程只读)
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: u32,
    pub bbox: BBox,
    /// 被跟踪的总帧数
    pub age: u32,
}

/// 采集帧 (采集线程独占, 编码后丢弃)
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Local>,
    pub seq: u64,
}

impl Frame {
    pub fn new(image: RgbImage, seq: u64) -> Self {
        Self {
            image,
            captured_at: Local::now(),
            seq,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// 只保留白名单车辆且达到置信度下限的检测
pub fn retain_vehicles(detections: Vec<Detection>, min_confidence: f32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.is_vehicle() && d.confidence >= min_confidence)
        .collect()
}
