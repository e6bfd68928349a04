//! 采集线程主循环 (StreamProducer)
//!
//! 每帧: 读帧 → 检测 → 车辆过滤 → 跟踪 → 判定/标注 → 编码 → 生成事件 → 状态替换/告警 → 推流
//!
//! 编码失败的帧整帧跳过, 不生成事件也不占用冷却窗口.
//! 状态替换先于推流, 慢速推流客户端不会拖住状态更新.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::{Engine, PipelineConfig, PipelineState};
use crate::alert::{AlertDispatcher, AlertJob, LocationResolver};
use crate::detection::retain_vehicles;
use crate::error::{Result, SentinelError};
use crate::events::{Event, EventKind};
use crate::input::{FrameSource, StopSignal};
use crate::status::{EventHistory, StatusStore, StatusUpdate};
use crate::stream::{encode_jpeg, MjpegBroadcaster};

/// 采集线程用到的共享组件
#[derive(Clone)]
pub struct CycleServices {
    pub status: Arc<StatusStore>,
    pub history: Arc<EventHistory>,
    pub stream: Arc<MjpegBroadcaster>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub resolver: Arc<LocationResolver>,
}

/// 滚动统计 (每秒输出一次)
struct CycleStats {
    frames: u64,
    count: u64,
    last: Instant,
    current_fps: f64,
    detect_ms: f64,
    track_ms: f64,
    evaluate_ms: f64,
    encode_ms: f64,
}

impl CycleStats {
    fn new() -> Self {
        Self {
            frames: 0,
            count: 0,
            last: Instant::now(),
            current_fps: 0.0,
            detect_ms: 0.0,
            track_ms: 0.0,
            evaluate_ms: 0.0,
            encode_ms: 0.0,
        }
    }

    fn tick(&mut self, subscribers: usize) {
        self.frames += 1;
        self.count += 1;
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            self.current_fps = self.count as f64 / elapsed;
            let n = self.count as f64;
            debug!(
                "📊 FPS {:.1} | 检测 {:.1}ms | 跟踪 {:.1}ms | 判定 {:.1}ms | 编码 {:.1}ms | 观看 {}",
                self.current_fps,
                self.detect_ms / n,
                self.track_ms / n,
                self.evaluate_ms / n,
                self.encode_ms / n,
                subscribers
            );
            self.count = 0;
            self.detect_ms = 0.0;
            self.track_ms = 0.0;
            self.evaluate_ms = 0.0;
            self.encode_ms = 0.0;
            self.last = Instant::now();
        }
    }
}

fn ms_since(t: Instant) -> f64 {
    t.elapsed().as_secs_f64() * 1000.0
}

/// 运行一次 PipelineRun, 直到停止信号、流结束或推理失败
pub(crate) fn run(
    mut source: Box<dyn FrameSource>,
    stop: StopSignal,
    engine: Arc<Mutex<Engine>>,
    services: CycleServices,
    config: PipelineConfig,
    state: Arc<Mutex<PipelineState>>,
) {
    info!("🎬 采集线程启动: {}", source.describe());
    let mut engine = engine.lock().unwrap_or_else(PoisonError::into_inner);
    let mut stats = CycleStats::new();

    let exit = loop {
        if stop.is_raised() {
            break None;
        }
        if let Err(e) = process_frame(source.as_mut(), &stop, &mut engine, &services, &config, &mut stats) {
            break Some(e);
        }
    };

    source.close();
    services.stream.close();
    drop(engine);

    match &exit {
        None | Some(SentinelError::StreamEnded) if stop.is_raised() => info!("🛑 采集线程收到停止信号"),
        Some(SentinelError::StreamEnded) => info!("📹 视频流结束"),
        Some(e) => error!("❌ 采集循环终止: {}", e),
        None => {}
    }

    // 自然结束时由采集线程自己回到 Idle; Stopping 由 stop() 收尾
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    if *state == PipelineState::Running {
        *state = PipelineState::Idle;
        services
            .status
            .replace(StatusUpdate::new().camera_connected(false));
    }
    info!("✅ 采集线程退出, 共处理 {} 帧", stats.frames);
}

fn process_frame(
    source: &mut dyn FrameSource,
    stop: &StopSignal,
    engine: &mut Engine,
    services: &CycleServices,
    config: &PipelineConfig,
    stats: &mut CycleStats,
) -> Result<()> {
    let mut frame = source.read(stop)?;

    let t = Instant::now();
    let detections = engine.detector.detect(&frame)?;
    let vehicles = retain_vehicles(detections, config.min_confidence);
    stats.detect_ms += ms_since(t);

    let t = Instant::now();
    let tracks = engine.tracker.update(&vehicles, &frame)?;
    stats.track_ms += ms_since(t);

    let t = Instant::now();
    let findings = engine.evaluator.evaluate(&mut frame.image, &tracks);
    stats.evaluate_ms += ms_since(t);

    let t = Instant::now();
    let jpeg = match encode_jpeg(&frame.image, config.jpeg_quality) {
        Ok(jpeg) => jpeg,
        Err(e) => {
            warn!("⚠️ 帧 {} 编码失败, 跳过: {}", frame.seq, e);
            return Ok(());
        }
    };
    stats.encode_ms += ms_since(t);

    let events = if findings.is_empty() {
        Vec::new()
    } else {
        engine
            .evaluator
            .events(&findings, frame.captured_at, services.resolver.cached())
    };
    if !events.is_empty() {
        services.status.replace(event_update(&events));
        for event in events {
            services.history.record(event.clone());
            services.dispatcher.dispatch(AlertJob {
                event,
                jpeg: jpeg.clone(),
            });
        }
    }

    let subscribers = services.stream.publish(jpeg);
    stats.tick(subscribers);
    Ok(())
}

/// 本帧事件对应的完整状态替换; 多个事件时以最后一个 (火情) 为准
fn event_update(events: &[Event]) -> StatusUpdate {
    let has = |kind: EventKind| events.iter().any(|e| e.kind == kind);
    let mut update = StatusUpdate::new()
        .accident_detected(has(EventKind::Collision))
        .fire_detected(has(EventKind::Fire))
        .alert_sent(false)
        .camera_connected(true);
    if let Some(last) = events.last() {
        update = update
            .last_event(Some(last.kind))
            .last_image_path(Some(last.image_path.clone()))
            .location(last.location.clone());
    }
    update
}
