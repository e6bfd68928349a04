// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! ByteTrack 车辆跟踪
//!
//! 1. 高低分检测框分开处理
//! 2. 高分框优先与所有轨迹做 IoU 匹配
//! 3. 低分框救援未匹配的轨迹
//! 4. 纯运动模型, 不依赖外观特征

use super::tracker::{KalmanBoxFilter, Tracker};
use super::types::{BBox, Detection, Frame, Track};
use crate::error::Result;

/// 单条车辆轨迹
#[derive(Clone, Debug)]
struct VehicleTrack {
    id: u32,
    kalman: KalmanBoxFilter,
    bbox: BBox,
    frames_lost: u32,
    total_frames: u32,
    /// 本帧是否被观测更新
    observed: bool,
}

impl VehicleTrack {
    fn new(id: u32, bbox: BBox) -> Self {
        // 较小的观测噪声: 车辆运动快, 更信任检测结果
        let kalman = KalmanBoxFilter::new(&bbox, 0.1, 0.5);
        Self {
            id,
            bbox: kalman.bbox(),
            kalman,
            frames_lost: 0,
            total_frames: 1,
            observed: true,
        }
    }

    fn predict(&mut self) {
        self.kalman.predict();
        self.bbox = self.kalman.bbox();
        self.observed = false;
    }

    fn observe(&mut self, bbox: &BBox) {
        self.kalman.update(bbox);
        self.bbox = self.kalman.bbox();
        self.frames_lost = 0;
        self.total_frames += 1;
        self.observed = true;
    }

    fn to_track(&self) -> Track {
        Track {
            id: self.id,
            bbox: self.bbox,
            age: self.total_frames,
        }
    }
}

/// ByteTrack 阈值配置
#[derive(Clone, Debug)]
pub struct ByteTrackConfig {
    /// 最大允许丢失帧数
    pub max_lost_frames: u32,
    pub high_score_threshold: f32,
    /// 低于此分数的检测直接丢弃
    pub low_score_threshold: f32,
    pub high_iou_threshold: f32,
    pub low_iou_threshold: f32,
}

impl Default for ByteTrackConfig {
    fn default() -> Self {
        Self {
            max_lost_frames: 30,
            high_score_threshold: 0.6,
            low_score_threshold: 0.1,
            high_iou_threshold: 0.3,
            low_iou_threshold: 0.2,
        }
    }
}

/// ByteTrack 追踪器
pub struct ByteTracker {
    tracks: Vec<VehicleTrack>,
    next_id: u32,
    config: ByteTrackConfig,
}

impl ByteTracker {
    pub fn new(config: ByteTrackConfig) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            config,
        }
    }

    /// 三步匹配, 返回本帧被观测到的轨迹
    fn associate(&mut self, detections: &[Detection]) -> Vec<Track> {
        for track in &mut self.tracks {
            track.predict();
        }

        let (high, low): (Vec<usize>, Vec<usize>) = (0..detections.len())
            .filter(|&i| detections[i].confidence >= self.config.low_score_threshold)
            .partition(|&i| detections[i].confidence >= self.config.high_score_threshold);

        let mut det_used = vec![false; detections.len()];
        let mut track_used = vec![false; self.tracks.len()];

        // 第一轮: 高分检测 + 所有轨迹
        let all_tracks: Vec<usize> = (0..self.tracks.len()).collect();
        for (d, t) in self.greedy_match(detections, &high, &all_tracks, self.config.high_iou_threshold)
        {
            det_used[d] = true;
            track_used[t] = true;
            self.tracks[t].observe(&detections[d].bbox);
        }

        // 第二轮: 低分检测救援未匹配轨迹
        let unmatched: Vec<usize> = all_tracks.into_iter().filter(|&t| !track_used[t]).collect();
        for (d, t) in self.greedy_match(detections, &low, &unmatched, self.config.low_iou_threshold) {
            det_used[d] = true;
            track_used[t] = true;
            self.tracks[t].observe(&detections[d].bbox);
        }

        for (t, used) in track_used.iter().enumerate() {
            if !used {
                self.tracks[t].frames_lost += 1;
            }
        }

        // 未匹配的高分检测 → 新轨迹
        for &d in &high {
            if !det_used[d] {
                self.tracks.push(VehicleTrack::new(self.next_id, detections[d].bbox));
                self.next_id += 1;
            }
        }

        let max_lost = self.config.max_lost_frames;
        self.tracks.retain(|t| t.frames_lost <= max_lost);

        self.tracks
            .iter()
            .filter(|t| t.observed)
            .map(VehicleTrack::to_track)
            .collect()
    }

    /// 贪心 IoU 匹配: 按 IoU 从高到低分配, 返回 (检测下标, 轨迹下标)
    ///
    /// 轨迹框已在本帧 predict 之后更新, 直接与检测比较
    fn greedy_match(
        &self,
        detections: &[Detection],
        det_indices: &[usize],
        track_indices: &[usize],
        iou_threshold: f32,
    ) -> Vec<(usize, usize)> {
        let mut candidates = Vec::new();
        for &d in det_indices {
            for &t in track_indices {
                let iou = detections[d].bbox.iou(&self.tracks[t].bbox);
                if iou >= iou_threshold {
                    candidates.push((iou, d, t));
                }
            }
        }
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut det_taken = Vec::new();
        let mut track_taken = Vec::new();
        let mut assignments = Vec::new();
        for (_, d, t) in candidates {
            if !det_taken.contains(&d) && !track_taken.contains(&t) {
                det_taken.push(d);
                track_taken.push(t);
                assignments.push((d, t));
            }
        }
        assignments
    }
}

impl Default for ByteTracker {
    fn default() -> Self {
        Self::new(ByteTrackConfig::default())
    }
}

impl Tracker for ByteTracker {
    fn update(&mut self, detections: &[Detection], _frame: &Frame) -> Result<Vec<Track>> {
        Ok(self.associate(detections))
    }

    fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }

    fn track_count(&self) -> usize {
        self.tracks.len()
    }
}
