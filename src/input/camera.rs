//! FFmpeg 输入 - 本地摄像头 / RTSP 拉流
//!
//! 摄像头支持 DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux).
//! 解码在 FFmpeg 调度线程中进行, 帧经有界通道交给采集线程.

use std::time::Duration;

use crossbeam_channel::{select, Receiver};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::core::scheduler::ffmpeg_scheduler::{FfmpegScheduler, Running};
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::RgbImage;
use tracing::{info, warn};

use super::decode_filter::DecodeFilter;
use super::{FrameSource, StopSignal};
use crate::detection::Frame;
use crate::error::{Result, SentinelError};

/// 首帧最长等待时间, 超时视为流结束
const READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub enum StreamInput {
    Camera(usize),
    Rtsp(String),
}

pub struct FfmpegSource {
    input: StreamInput,
    frames: Option<Receiver<RgbImage>>,
    scheduler: Option<FfmpegScheduler<Running>>,
    seq: u64,
}

impl FfmpegSource {
    pub fn new(input: StreamInput) -> Self {
        Self {
            input,
            frames: None,
            scheduler: None,
            seq: 0,
        }
    }

    /// 格式化摄像头URL - 根据平台选择
    fn camera_url(index: usize) -> String {
        #[cfg(target_os = "windows")]
        {
            let devices = get_camera_devices();
            match devices.get(index) {
                Some((_, name)) => format!("video={}", name),
                None => format!("video={}", index),
            }
        }
        #[cfg(target_os = "linux")]
        {
            format!("/dev/video{}", index)
        }
        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        {
            format!("{}", index)
        }
    }

    fn camera_format() -> &'static str {
        #[cfg(target_os = "windows")]
        let format = "dshow";

        #[cfg(target_os = "macos")]
        let format = "avfoundation";

        #[cfg(target_os = "linux")]
        let format = "v4l2";

        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        let format = "video4linux2";

        format
    }

    fn build_input(&self) -> Input {
        match &self.input {
            StreamInput::Camera(index) => {
                Input::new(Self::camera_url(*index)).set_format(Self::camera_format())
            }
            StreamInput::Rtsp(url) => Input::new(url.as_str())
                .set_input_opts([("rtsp_transport", "tcp"), ("stimeout", "5000000")].into()),
        }
    }
}

impl FrameSource for FfmpegSource {
    fn open(&mut self) -> Result<()> {
        let (tx, rx) = crossbeam_channel::bounded(2);

        let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
        let pipe = pipe.filter("decode", Box::new(DecodeFilter::new(tx)));
        let out = create_null_output().add_frame_pipeline(pipe);

        let ctx = FfmpegContext::builder()
            .input(self.build_input())
            .output(out)
            .build()
            .map_err(|e| SentinelError::DeviceUnavailable(format!("{}: {e}", self.describe())))?;
        let sch = ctx
            .start()
            .map_err(|e| SentinelError::DeviceUnavailable(format!("{}: {e}", self.describe())))?;

        info!("✅ 视频源连接成功: {}", self.describe());
        self.frames = Some(rx);
        self.scheduler = Some(sch);
        Ok(())
    }

    fn read(&mut self, stop: &StopSignal) -> Result<Frame> {
        let frames = self.frames.as_ref().ok_or(SentinelError::StreamEnded)?;
        select! {
            recv(frames) -> msg => match msg {
                Ok(image) => {
                    self.seq += 1;
                    Ok(Frame::new(image, self.seq))
                }
                Err(_) => Err(SentinelError::StreamEnded),
            },
            recv(stop.receiver()) -> _ => Err(SentinelError::StreamEnded),
            default(READ_TIMEOUT) => {
                warn!("⚠️ {} 超过 {:?} 无新帧", self.describe(), READ_TIMEOUT);
                Err(SentinelError::StreamEnded)
            }
        }
    }

    /// 中止 FFmpeg 调度并等待其线程全部退出, 返回时设备已释放
    fn close(&mut self) {
        self.frames = None;
        if let Some(sch) = self.scheduler.take() {
            sch.abort();
            if let Err(e) = sch.wait() {
                warn!("⚠️ 解码结束 {}: {}", self.describe(), e);
            }
            info!("🛑 视频源已释放: {}", self.describe());
        }
    }

    fn describe(&self) -> String {
        match &self.input {
            StreamInput::Camera(index) => format!("camera:{}", index),
            StreamInput::Rtsp(url) => format!("rtsp:{}", url),
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// 获取可用的摄像头设备列表
pub fn get_camera_devices() -> Vec<(usize, String)> {
    match ez_ffmpeg::device::get_input_video_devices() {
        Ok(devices) => devices.into_iter().enumerate().collect(),
        Err(e) => {
            warn!("⚠️ 获取摄像头列表失败: {}", e);
            vec![]
        }
    }
}
