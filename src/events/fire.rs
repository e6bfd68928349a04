//! 火焰颜色检测
//!
//! RGB → HSV (8位: H∈[0,180], S,V∈[0,255]) → 阈值掩码 → 外轮廓 → 面积过滤

use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};

use crate::detection::BBox;

/// 火焰 HSV 阈值与最小轮廓面积
#[derive(Clone, Debug)]
pub struct FireConfig {
    /// 下界 [H, S, V], 含
    pub lower: [u8; 3],
    /// 上界 [H, S, V], 含
    pub upper: [u8; 3],
    /// 轮廓面积必须严格大于此值
    pub min_area: f64,
}

impl Default for FireConfig {
    fn default() -> Self {
        Self {
            lower: [10, 150, 150],
            upper: [30, 255, 255],
            min_area: 1000.0,
        }
    }
}

/// 一个满足面积条件的火焰区域
#[derive(Clone, Debug, PartialEq)]
pub struct FireHit {
    pub region: BBox,
    pub area: f64,
}

/// 单像素 RGB → HSV, 8位量化 (H 为角度的一半)
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let v = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let diff = v - min;

    let s = if v > 0.0 { 255.0 * diff / v } else { 0.0 };
    let mut h = if diff == 0.0 {
        0.0
    } else if v == rf {
        60.0 * (gf - bf) / diff
    } else if v == gf {
        120.0 + 60.0 * (bf - rf) / diff
    } else {
        240.0 + 60.0 * (rf - gf) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    [
        (h / 2.0).round().min(180.0) as u8,
        s.round() as u8,
        v as u8,
    ]
}

/// 生成火焰颜色掩码 (命中为255)
pub fn fire_mask(image: &RgbImage, config: &FireConfig) -> GrayImage {
    let mut mask = GrayImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let hsv = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
        let inside = (0..3).all(|c| hsv[c] >= config.lower[c] && hsv[c] <= config.upper[c]);
        if inside {
            mask.put_pixel(x, y, Luma([255]));
        }
    }
    mask
}

/// 轮廓多边形面积 (鞋带公式, 以像素中心为顶点)
pub fn contour_area(contour: &Contour<i32>) -> f64 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0i64;
    for i in 0..points.len() {
        let p = points[i];
        let q = points[(i + 1) % points.len()];
        twice_area += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    twice_area.abs() as f64 / 2.0
}

fn bounding_rect(contour: &Contour<i32>) -> BBox {
    let xs = contour.points.iter().map(|p| p.x);
    let ys = contour.points.iter().map(|p| p.y);
    let (x_min, x_max) = (xs.clone().min().unwrap_or(0), xs.max().unwrap_or(0));
    let (y_min, y_max) = (ys.clone().min().unwrap_or(0), ys.max().unwrap_or(0));
    BBox::new(x_min as f32, y_min as f32, (x_max + 1) as f32, (y_max + 1) as f32)
}

/// 检测火焰区域, 返回所有面积 > min_area 的外轮廓
pub fn detect_fire(image: &RgbImage, config: &FireConfig) -> Vec<FireHit> {
    if image.width() == 0 || image.height() == 0 {
        return Vec::new();
    }
    let mask = fire_mask(image, config);
    find_contours::<i32>(&mask)
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| {
            let area = contour_area(c);
            (area > config.min_area).then(|| FireHit {
                region: bounding_rect(c),
                area,
            })
        })
        .collect()
}
