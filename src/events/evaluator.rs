//! 事件判定器
//!
//! 每帧无条件执行碰撞与火焰两项检查, 命中时原地标注帧.
//! 冷却窗口决定命中是否生成 Event.

use std::path::PathBuf;
use std::time::Duration;

use ab_glyph::FontArc;
use chrono::{DateTime, Local};
use image::RgbImage;

use super::annotate::{self, ACCIDENT_COLOR, ACCIDENT_LABEL, FIRE_COLOR, FIRE_LABEL};
use super::collision::{check_collision, CollisionHit, DEFAULT_IOU_THRESHOLD};
use super::cooldown::CooldownGate;
use super::fire::{detect_fire, FireConfig, FireHit};
use super::{Event, EventKind};
use crate::detection::{BBox, Track};

#[derive(Clone, Debug)]
pub struct EvaluatorConfig {
    /// 碰撞 IoU 阈值 (严格大于)
    pub iou_threshold: f32,
    pub fire: FireConfig,
    /// 同类事件冷却时间, 0 表示每帧都上报
    pub cooldown: Duration,
    pub font_path: Option<PathBuf>,
    pub label_size: f32,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            fire: FireConfig::default(),
            cooldown: Duration::from_secs(10),
            font_path: None,
            label_size: 24.0,
        }
    }
}

/// 单帧检查结果
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameFindings {
    pub collision: Option<CollisionHit>,
    pub fire: Vec<FireHit>,
}

impl FrameFindings {
    pub fn is_empty(&self) -> bool {
        self.collision.is_none() && self.fire.is_empty()
    }

    /// 命中的事件类型及区域, 碰撞在前
    pub fn hits(&self) -> Vec<(EventKind, BBox)> {
        let mut hits = Vec::new();
        if let Some(c) = &self.collision {
            hits.push((EventKind::Collision, c.region()));
        }
        // 多个火焰区域取面积最大者作为事件区域
        if let Some(f) = self.fire.iter().max_by(|a, b| a.area.total_cmp(&b.area)) {
            hits.push((EventKind::Fire, f.region));
        }
        hits
    }
}

pub struct EventEvaluator {
    config: EvaluatorConfig,
    font: Option<FontArc>,
    cooldown: CooldownGate,
    next_id: u64,
}

impl EventEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        let font = config.font_path.as_deref().and_then(annotate::load_font);
        let cooldown = CooldownGate::new(config.cooldown);
        Self {
            config,
            font,
            cooldown,
            next_id: 1,
        }
    }

    /// 两项检查都在未标注的原始像素上进行, 然后统一标注
    pub fn evaluate(&self, image: &mut RgbImage, tracks: &[Track]) -> FrameFindings {
        let findings = FrameFindings {
            collision: check_collision(tracks, self.config.iou_threshold),
            fire: detect_fire(image, &self.config.fire),
        };
        self.annotate(image, &findings);
        findings
    }

    fn annotate(&self, image: &mut RgbImage, findings: &FrameFindings) {
        let font = self.font.as_ref();
        let size = self.config.label_size;
        if let Some(hit) = &findings.collision {
            for bbox in [&hit.first.bbox, &hit.second.bbox] {
                annotate::draw_box(image, bbox, ACCIDENT_COLOR, 3);
            }
            annotate::draw_label(image, font, &hit.first.bbox, ACCIDENT_LABEL, ACCIDENT_COLOR, size);
        }
        for fire in &findings.fire {
            annotate::draw_box(image, &fire.region, FIRE_COLOR, 4);
            annotate::draw_label(image, font, &fire.region, FIRE_LABEL, FIRE_COLOR, size);
        }
    }

    /// 按冷却窗口生成事件 (每类最多一个)
    pub fn events(
        &mut self,
        findings: &FrameFindings,
        timestamp: DateTime<Local>,
        location: Option<String>,
    ) -> Vec<Event> {
        let mut events = Vec::new();
        for (kind, region) in findings.hits() {
            if !self.cooldown.admit(kind, timestamp) {
                continue;
            }
            events.push(Event::new(self.next_id, kind, region, timestamp, location.clone()));
            self.next_id += 1;
        }
        events
    }

    /// 新一轮运行开始时清空冷却状态
    pub fn reset(&mut self) {
        self.cooldown.reset();
    }
}
