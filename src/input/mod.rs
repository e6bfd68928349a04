/// 视频输入系统 (Video Input System)
///
/// - FrameSource: 帧源统一接口 (open → read* → close)
/// - ImageDirSource: 图片目录回放 (测试 / 离线复现)
/// - FfmpegSource: 本地摄像头 / RTSP 拉流 (feature = "ffmpeg")
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::detection::Frame;
use crate::error::Result;

#[cfg(feature = "ffmpeg")]
pub mod camera;
#[cfg(feature = "ffmpeg")]
pub mod decode_filter;
pub mod image_dir;

#[cfg(feature = "ffmpeg")]
pub use camera::{get_camera_devices, FfmpegSource, StreamInput};
pub use image_dir::ImageDirSource;

/// 帧源 Trait
///
/// 由采集线程独占. `read` 在流结束或收到停止信号时返回 `StreamEnded`.
pub trait FrameSource: Send {
    /// 打开设备, 失败返回 `DeviceUnavailable`
    fn open(&mut self) -> Result<()>;

    /// 阻塞读取下一帧
    fn read(&mut self, stop: &StopSignal) -> Result<Frame>;

    /// 释放设备 (可重复调用)
    fn close(&mut self);

    /// 日志用名称
    fn describe(&self) -> String;
}

/// 每次 start() 创建一个新的帧源
pub type SourceFactory = Box<dyn Fn() -> Box<dyn FrameSource> + Send + Sync>;

// ========== 停止信号 ==========

/// 停止信号发送端, 丢弃即触发停止
pub struct StopHandle {
    _tx: Sender<()>,
}

/// 停止信号接收端 (采集线程持有)
///
/// 发送端被丢弃后通道断开, 所有等待立即返回.
#[derive(Clone)]
pub struct StopSignal {
    rx: Receiver<()>,
}

/// 创建一对停止信号
pub fn stop_signal() -> (StopHandle, StopSignal) {
    let (tx, rx) = crossbeam_channel::bounded(0);
    (StopHandle { _tx: tx }, StopSignal { rx })
}

impl StopHandle {
    /// 触发停止
    pub fn raise(self) {
        drop(self);
    }
}

impl StopSignal {
    pub fn is_raised(&self) -> bool {
        !matches!(self.rx.try_recv(), Err(TryRecvError::Empty))
    }

    /// 最多等待 `timeout`, 期间收到停止信号返回 true
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        !matches!(self.rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }

    /// 用于 `crossbeam_channel::select!`
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
