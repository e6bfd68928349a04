//! 帧标注: 事件框与文字标签

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::warn;

use crate::detection::BBox;

pub const ACCIDENT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const FIRE_COLOR: Rgb<u8> = Rgb([255, 165, 0]);

pub const ACCIDENT_LABEL: &str = "ACCIDENT!";
pub const FIRE_LABEL: &str = "FIRE DETECTED!";

/// 加载标签字体, 失败时只画框不写字
pub fn load_font(path: &Path) -> Option<FontArc> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            warn!("⚠️ 字体加载失败 {}: {}", path.display(), e);
            return None;
        }
    };
    match FontArc::try_from_vec(bytes) {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("⚠️ 字体解析失败 {}: {}", path.display(), e);
            None
        }
    }
}

/// 画指定线宽的空心矩形 (向内收缩)
pub fn draw_box(image: &mut RgbImage, bbox: &BBox, color: Rgb<u8>, thickness: u32) {
    let max_x = image.width() as f32;
    let max_y = image.height() as f32;
    let x1 = bbox.x1.clamp(0.0, max_x) as i32;
    let y1 = bbox.y1.clamp(0.0, max_y) as i32;
    let x2 = bbox.x2.clamp(0.0, max_x) as i32;
    let y2 = bbox.y2.clamp(0.0, max_y) as i32;

    for t in 0..thickness as i32 {
        let w = x2 - x1 - 2 * t;
        let h = y2 - y1 - 2 * t;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(x1 + t, y1 + t).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// 在框上方 10 像素处写标签
pub fn draw_label(
    image: &mut RgbImage,
    font: Option<&FontArc>,
    bbox: &BBox,
    text: &str,
    color: Rgb<u8>,
    size: f32,
) {
    let Some(font) = font else {
        return;
    };
    let x = bbox.x1.max(0.0) as i32;
    let y = (bbox.y1 - 10.0 - size).max(0.0) as i32;
    draw_text_mut(image, color, x, y, PxScale::from(size), font, text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_box_thickness() {
        let mut img = RgbImage::new(50, 50);
        draw_box(&mut img, &BBox::new(10.0, 10.0, 40.0, 40.0), ACCIDENT_COLOR, 3);
        assert_eq!(*img.get_pixel(10, 20), ACCIDENT_COLOR);
        assert_eq!(*img.get_pixel(12, 20), ACCIDENT_COLOR);
        assert_eq!(*img.get_pixel(13, 20), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(25, 25), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_degenerate_and_out_of_frame_boxes() {
        let mut img = RgbImage::new(20, 20);
        draw_box(&mut img, &BBox::new(5.0, 5.0, 5.0, 15.0), FIRE_COLOR, 4);
        draw_box(&mut img, &BBox::new(-30.0, -30.0, 100.0, 100.0), FIRE_COLOR, 2);
        assert_eq!(*img.get_pixel(0, 10), FIRE_COLOR);
    }

    #[test]
    fn test_label_without_font_is_noop() {
        let mut img = RgbImage::new(20, 20);
        draw_label(&mut img, None, &BBox::new(0.0, 15.0, 10.0, 20.0), ACCIDENT_LABEL, ACCIDENT_COLOR, 12.0);
        assert!(img.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_missing_font_file() {
        assert!(load_font(Path::new("/no/such/font.ttf")).is_none());
    }
}
