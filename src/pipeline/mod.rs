/// 视频处理流水线 (Video Processing Pipeline)
///
/// 两类线程:
/// - 采集线程: 读帧 → 检测 → 跟踪 → 事件判定 → 推流 (每次运行一个)
/// - 告警线程: 证据/通知/记录 (AlertDispatcher 线程池)
///
/// `Pipeline` 是唯一的启停入口 (LifecycleController), 由宿主进程构造一次并共享.
pub mod cycle;

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use serde::Serialize;
use tracing::{error, info};

use crate::detection::{Detector, Tracker, MIN_CONFIDENCE};
use crate::error::Result;
use crate::events::EventEvaluator;
use crate::input::{stop_signal, SourceFactory, StopHandle};
use crate::status::StatusUpdate;

pub use cycle::CycleServices;

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub jpeg_quality: u8,
    /// 车辆检测置信度下限
    pub min_confidence: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            min_confidence: MIN_CONFIDENCE,
        }
    }
}

/// 推理组件, 跨运行保留 (每次 start 重置跟踪状态)
pub struct Engine {
    pub detector: Box<dyn Detector>,
    pub tracker: Box<dyn Tracker>,
    pub evaluator: EventEvaluator,
}

impl Engine {
    fn reset(&mut self) {
        self.tracker.reset();
        self.evaluator.reset();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Running,
    Stopping,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    AlreadyIdle,
}

impl StartOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            StartOutcome::Started => "Detection started",
            StartOutcome::AlreadyRunning => "Detection already running",
        }
    }
}

impl StopOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            StopOutcome::Stopped => "Detection stopped",
            StopOutcome::AlreadyIdle => "Detection not running",
        }
    }
}

/// 当前运行的句柄
struct ActiveRun {
    stop: StopHandle,
    handle: JoinHandle<()>,
}

pub struct Pipeline {
    config: PipelineConfig,
    factory: SourceFactory,
    engine: Arc<Mutex<Engine>>,
    services: CycleServices,
    state: Arc<Mutex<PipelineState>>,
    /// 串行化 start/stop
    control: Mutex<Option<ActiveRun>>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        factory: SourceFactory,
        engine: Engine,
        services: CycleServices,
    ) -> Self {
        Self {
            config,
            factory,
            engine: Arc::new(Mutex::new(engine)),
            services,
            state: Arc::new(Mutex::new(PipelineState::Idle)),
            control: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn services(&self) -> &CycleServices {
        &self.services
    }

    /// 启动采集. 运行中再次调用为空操作; 设备无法打开时返回 `DeviceUnavailable`
    pub fn start(&self) -> Result<StartOutcome> {
        let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        if self.state() == PipelineState::Running {
            return Ok(StartOutcome::AlreadyRunning);
        }

        // 上一次运行已自然结束, 回收线程
        if let Some(previous) = control.take() {
            Self::join(previous.handle);
        }

        let mut source = (self.factory)();
        source.open()?;
        self.engine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();

        let (stop, signal) = stop_signal();
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = PipelineState::Running;
        self.services
            .status
            .replace(StatusUpdate::new().camera_connected(true));

        let engine = Arc::clone(&self.engine);
        let services = self.services.clone();
        let config = self.config.clone();
        let state = Arc::clone(&self.state);
        let spawned = std::thread::Builder::new()
            .name("sentinel-cycle".into())
            .spawn(move || cycle::run(source, signal, engine, services, config, state));

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                *self.state.lock().unwrap_or_else(PoisonError::into_inner) = PipelineState::Idle;
                self.services
                    .status
                    .replace(StatusUpdate::new().camera_connected(false));
                return Err(e.into());
            }
        };

        *control = Some(ActiveRun { stop, handle });
        info!("✅ 检测已启动");
        Ok(StartOutcome::Started)
    }

    /// 停止采集并等待采集线程完全退出. 空闲时为空操作
    pub fn stop(&self) -> StopOutcome {
        let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(run) = control.take() else {
            return StopOutcome::AlreadyIdle;
        };

        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != PipelineState::Running {
                // 已自然结束, 只需回收线程
                drop(state);
                Self::join(run.handle);
                return StopOutcome::AlreadyIdle;
            }
            *state = PipelineState::Stopping;
        }

        run.stop.raise();
        Self::join(run.handle);

        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = PipelineState::Idle;
        self.services
            .status
            .replace(StatusUpdate::new().camera_connected(false));
        info!("🛑 检测已停止");
        StopOutcome::Stopped
    }

    fn join(handle: JoinHandle<()>) {
        if handle.join().is_err() {
            error!("❌ 采集线程异常退出");
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
