//! 图片目录输入 - 按文件名顺序回放 jpg/png 帧
//!
//! 无需摄像头即可复现事故片段, 也是集成测试使用的帧源.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::{FrameSource, StopSignal};
use crate::detection::Frame;
use crate::error::{Result, SentinelError};

const EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub struct ImageDirSource {
    dir: PathBuf,
    /// 0 表示不限速
    fps: f64,
    looping: bool,
    files: Vec<PathBuf>,
    cursor: usize,
    seq: u64,
    next_due: Option<Instant>,
}

impl ImageDirSource {
    pub fn new(dir: impl Into<PathBuf>, fps: f64, looping: bool) -> Self {
        Self {
            dir: dir.into(),
            fps,
            looping,
            files: Vec::new(),
            cursor: 0,
            seq: 0,
            next_due: None,
        }
    }

    fn scan(dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            SentinelError::DeviceUnavailable(format!("{}: {e}", dir.display()))
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// 按帧率节流, 等待期间可被停止信号打断
    fn pace(&mut self, stop: &StopSignal) -> Result<()> {
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Ok(());
        }
        let Ok(interval) = Duration::try_from_secs_f64(1.0 / self.fps) else {
            return Ok(());
        };
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now && stop.wait_timeout(due - now) {
                return Err(SentinelError::StreamEnded);
            }
        }
        self.next_due = Some(self.next_due.map_or(now, |due| due.max(now)) + interval);
        Ok(())
    }
}

impl FrameSource for ImageDirSource {
    fn open(&mut self) -> Result<()> {
        self.files = Self::scan(&self.dir)?;
        if self.files.is_empty() {
            return Err(SentinelError::DeviceUnavailable(format!(
                "{}: no jpg/png frames",
                self.dir.display()
            )));
        }
        self.cursor = 0;
        self.next_due = None;
        info!("✅ 图片目录已打开: {} ({} 帧)", self.dir.display(), self.files.len());
        Ok(())
    }

    fn read(&mut self, stop: &StopSignal) -> Result<Frame> {
        // 最多尝试一整轮, 避免目录中全是坏图时死循环
        for _ in 0..=self.files.len() {
            if stop.is_raised() {
                return Err(SentinelError::StreamEnded);
            }
            if self.cursor >= self.files.len() {
                if !self.looping || self.files.is_empty() {
                    return Err(SentinelError::StreamEnded);
                }
                self.cursor = 0;
            }
            self.pace(stop)?;

            let path = &self.files[self.cursor];
            self.cursor += 1;
            match image::open(path) {
                Ok(img) => {
                    self.seq += 1;
                    return Ok(Frame::new(img.to_rgb8(), self.seq));
                }
                Err(e) => warn!("⚠️ 跳过无法解码的帧 {}: {}", path.display(), e),
            }
        }
        Err(SentinelError::StreamEnded)
    }

    fn close(&mut self) {
        self.files.clear();
        self.cursor = 0;
    }

    fn describe(&self) -> String {
        format!("images:{}", self.dir.display())
    }
}
