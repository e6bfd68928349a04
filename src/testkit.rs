//! 单元测试共用的假帧源/假检测器和装配函数

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};

use crate::alert::{
    AlertConfig, AlertDispatcher, AlertServices, CoordinateGeocoder, EvidenceStore,
    JsonlRecordStore, LocationResolver, LogNotifier,
};
use crate::detection::{BBox, Detection, Detector, Frame, Track, Tracker};
use crate::error::{Result, SentinelError};
use crate::events::{EvaluatorConfig, EventEvaluator};
use crate::input::{FrameSource, StopSignal};
use crate::pipeline::{CycleServices, Engine, Pipeline, PipelineConfig, PipelineState};
use crate::status::{EventHistory, StatusStore};
use crate::stream::MjpegBroadcaster;

#[derive(Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
}

/// 火焰橙色
pub const FLAME: Rgb<u8> = Rgb([255, 128, 0]);

/// 128x64 画面帧源, `frames` 为 None 时一直产出直到停止
pub struct MockSource {
    counters: Arc<Counters>,
    frames: Option<usize>,
    fail_open: bool,
    fire: bool,
    empty_first_frame: bool,
    close_delay: Duration,
    produced: usize,
}

impl MockSource {
    fn image(&self) -> RgbImage {
        if self.empty_first_frame && self.produced == 1 {
            return RgbImage::new(0, 0);
        }
        let mut image = RgbImage::new(128, 64);
        if self.fire {
            // 60x40 的火焰色块
            for y in 10..50 {
                for x in 40..100 {
                    image.put_pixel(x, y, FLAME);
                }
            }
        }
        image
    }
}

impl FrameSource for MockSource {
    fn open(&mut self) -> Result<()> {
        if self.fail_open {
            return Err(SentinelError::DeviceUnavailable("mock camera 0".into()));
        }
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read(&mut self, stop: &StopSignal) -> Result<Frame> {
        if stop.wait_timeout(Duration::from_millis(2)) {
            return Err(SentinelError::StreamEnded);
        }
        if self.frames.is_some_and(|n| self.produced >= n) {
            return Err(SentinelError::StreamEnded);
        }
        self.produced += 1;
        Ok(Frame::new(self.image(), self.produced as u64))
    }

    fn close(&mut self) {
        std::thread::sleep(self.close_delay);
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        "mock".into()
    }
}

/// 每帧返回同一组检测
pub struct FixedDetector {
    detections: Vec<Detection>,
    fail: bool,
}

impl Detector for FixedDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        if self.fail {
            return Err(SentinelError::DetectorFailure("model offline".into()));
        }
        Ok(self.detections.clone())
    }
}

/// 按输入顺序编号
pub struct PassThroughTracker;

impl Tracker for PassThroughTracker {
    fn update(&mut self, detections: &[Detection], _frame: &Frame) -> Result<Vec<Track>> {
        Ok(detections
            .iter()
            .enumerate()
            .map(|(i, d)| Track {
                id: i as u32 + 1,
                bbox: d.bbox,
                age: 1,
            })
            .collect())
    }

    fn reset(&mut self) {}

    fn track_count(&self) -> usize {
        0
    }
}

/// 20x10 的汽车框
pub fn car(x: f32) -> Detection {
    Detection {
        bbox: BBox::new(x, 0.0, x + 20.0, 10.0),
        confidence: 0.9,
        class_id: 2,
    }
}

#[derive(Default)]
pub struct RigOptions {
    pub frames: Option<usize>,
    pub detections: Vec<Detection>,
    pub fail_open: bool,
    pub fail_detect: bool,
    /// 每帧带火焰色块
    pub fire: bool,
    /// 第一帧为空图 (编码失败)
    pub empty_first_frame: bool,
    /// 模拟释放设备耗时
    pub close_delay: Duration,
}

pub struct Rig {
    pub pipeline: Arc<Pipeline>,
    pub counters: Arc<Counters>,
    pub status: Arc<StatusStore>,
    pub history: Arc<EventHistory>,
    pub stream: Arc<MjpegBroadcaster>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub evidence_root: PathBuf,
    _dir: tempfile::TempDir,
}

pub fn rig(options: RigOptions) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let evidence_root = dir.path().join("evidence");
    let status = Arc::new(StatusStore::new());
    let history = Arc::new(EventHistory::default());
    let stream = Arc::new(MjpegBroadcaster::default());
    let resolver = Arc::new(LocationResolver::new(Box::new(CoordinateGeocoder), 1.0, 2.0));

    let alert_config = AlertConfig {
        retry_base: Duration::from_millis(1),
        ..Default::default()
    };
    let dispatcher = Arc::new(
        AlertDispatcher::new(
            alert_config,
            AlertServices {
                evidence: EvidenceStore::new(&evidence_root),
                resolver: resolver.clone(),
                notifier: Box::new(LogNotifier),
                records: Box::new(JsonlRecordStore::new(dir.path().join("events.jsonl"))),
                status: status.clone(),
            },
        )
        .unwrap(),
    );

    let counters = Arc::new(Counters::default());
    let factory_counters = counters.clone();
    let RigOptions {
        frames,
        detections,
        fail_open,
        fail_detect,
        fire,
        empty_first_frame,
        close_delay,
    } = options;
    let factory = Box::new(move || {
        Box::new(MockSource {
            counters: factory_counters.clone(),
            frames,
            fail_open,
            fire,
            empty_first_frame,
            close_delay,
            produced: 0,
        }) as Box<dyn FrameSource>
    });

    let engine = Engine {
        detector: Box::new(FixedDetector {
            detections,
            fail: fail_detect,
        }),
        tracker: Box::new(PassThroughTracker),
        evaluator: EventEvaluator::new(EvaluatorConfig::default()),
    };
    let services = CycleServices {
        status: status.clone(),
        history: history.clone(),
        stream: stream.clone(),
        dispatcher: dispatcher.clone(),
        resolver,
    };
    let pipeline = Arc::new(Pipeline::new(PipelineConfig::default(), factory, engine, services));

    Rig {
        pipeline,
        counters,
        status,
        history,
        stream,
        dispatcher,
        evidence_root,
        _dir: dir,
    }
}

/// 等待采集线程自然结束
pub fn wait_for_idle(pipeline: &Pipeline) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while pipeline.state() != PipelineState::Idle {
        assert!(Instant::now() < deadline, "pipeline did not return to idle");
        std::thread::sleep(Duration::from_millis(5));
    }
}
