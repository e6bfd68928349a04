//! 命令行参数 (每个选项都可以用环境变量覆盖)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::alert::{
    AlertConfig, CoordinateGeocoder, Geocoder, LogNotifier, Notifier, OpenCageGeocoder,
    WebhookNotifier,
};
use crate::detection::{DetectorConfig, MIN_CONFIDENCE};
use crate::error::{Result, SentinelError};
use crate::events::{EvaluatorConfig, FireConfig};
use crate::input::{FrameSource, ImageDirSource, SourceFactory};
use crate::pipeline::PipelineConfig;
use crate::web_api::WebConfig;

/// 视频输入类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum InputKind {
    /// 图片目录回放
    Images,
    /// 本地摄像头 (需要 ffmpeg feature)
    Camera,
    /// RTSP 拉流 (需要 ffmpeg feature)
    Rtsp,
}

/// 默认输入: 带 ffmpeg 时为摄像头, 否则为图片目录
#[cfg(feature = "ffmpeg")]
pub const DEFAULT_INPUT: InputKind = InputKind::Camera;
#[cfg(not(feature = "ffmpeg"))]
pub const DEFAULT_INPUT: InputKind = InputKind::Images;

/// 回放帧率上限
const MAX_IMAGE_FPS: f64 = 1000.0;

/// 回放帧率: 有限值且在 [0, 1000] 内
fn parse_fps(s: &str) -> std::result::Result<f64, String> {
    let fps: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if !fps.is_finite() || !(0.0..=MAX_IMAGE_FPS).contains(&fps) {
        return Err(format!("fps must be a number in 0..={MAX_IMAGE_FPS}"));
    }
    Ok(fps)
}

/// 车辆事故/火情实时监控服务
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "车辆事故/火情实时监控", long_about = None)]
pub struct Args {
    /// 监听地址
    #[arg(long, env = "SENTINEL_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// 监听端口
    #[arg(short, long, env = "SENTINEL_PORT", default_value_t = 5000)]
    pub port: u16,

    // ========== 视频输入 ==========
    /// 输入类型
    #[arg(short, long, env = "SENTINEL_INPUT", value_enum, default_value_t = DEFAULT_INPUT)]
    pub input: InputKind,

    /// 摄像头编号
    #[arg(long, env = "SENTINEL_CAMERA", default_value_t = 0)]
    pub camera_index: usize,

    /// RTSP 流地址
    #[arg(long, env = "SENTINEL_RTSP_URL")]
    pub rtsp_url: Option<String>,

    /// 图片目录
    #[arg(long, env = "SENTINEL_IMAGE_DIR", default_value = "frames")]
    pub image_dir: PathBuf,

    /// 图片回放帧率 (0 不限速)
    #[arg(long, env = "SENTINEL_IMAGE_FPS", default_value_t = 10.0, value_parser = parse_fps)]
    pub image_fps: f64,

    /// 图片播放完后从头循环
    #[arg(long, env = "SENTINEL_IMAGE_LOOP")]
    pub loop_images: bool,

    // ========== 检测 ==========
    /// 推理服务地址
    #[arg(long, env = "SENTINEL_DETECTOR_URL", default_value = "http://127.0.0.1:9000/detect")]
    pub detector_url: String,

    /// 推理请求超时 (毫秒)
    #[arg(long, env = "SENTINEL_DETECTOR_TIMEOUT_MS", default_value_t = 5000)]
    pub detector_timeout_ms: u64,

    /// 推理输入尺寸
    #[arg(long, env = "SENTINEL_INF_SIZE", default_value_t = 640)]
    pub inf_size: u32,

    /// 车辆置信度下限
    #[arg(long, env = "SENTINEL_CONFIDENCE", default_value_t = MIN_CONFIDENCE)]
    pub confidence: f32,

    // ========== 事件判定 ==========
    /// 碰撞 IoU 阈值
    #[arg(long, env = "SENTINEL_IOU_THRESHOLD", default_value_t = 0.4)]
    pub iou_threshold: f32,

    /// 火焰区域最小面积 (像素)
    #[arg(long, env = "SENTINEL_FIRE_MIN_AREA", default_value_t = 1000.0)]
    pub fire_min_area: f64,

    /// 同类事件冷却 (秒, 0 表示不冷却)
    #[arg(long, env = "SENTINEL_COOLDOWN_SECS", default_value_t = 10)]
    pub cooldown_secs: u64,

    /// 标签字体 (TTF/OTF), 不指定时只画框
    #[arg(long, env = "SENTINEL_FONT")]
    pub font: Option<PathBuf>,

    // ========== 告警 ==========
    /// 证据图片目录
    #[arg(long, env = "SENTINEL_EVIDENCE_DIR", default_value = "evidence")]
    pub evidence_dir: PathBuf,

    /// 摄像头纬度
    #[arg(long, env = "SENTINEL_LATITUDE", default_value_t = 12.9716, allow_hyphen_values = true)]
    pub latitude: f64,

    /// 摄像头经度
    #[arg(long, env = "SENTINEL_LONGITUDE", default_value_t = 77.5946, allow_hyphen_values = true)]
    pub longitude: f64,

    /// OpenCage API Key, 不指定时直接使用坐标
    #[arg(long, env = "OPENCAGE_API_KEY", hide_env_values = true)]
    pub opencage_key: Option<String>,

    /// 告警 Webhook 地址, 不指定时只写日志
    #[arg(long, env = "SENTINEL_WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// 告警接收人
    #[arg(long, env = "SENTINEL_RECIPIENT", default_value = "alerts@localhost")]
    pub recipient: String,

    /// 地理编码/通知请求超时 (毫秒)
    #[arg(long, env = "SENTINEL_ALERT_TIMEOUT_MS", default_value_t = 10000)]
    pub alert_timeout_ms: u64,

    /// 事件记录文件 (JSON Lines)
    #[arg(long, env = "SENTINEL_RECORDS", default_value = "evidence/events.jsonl")]
    pub records: PathBuf,

    /// 告警线程数
    #[arg(long, env = "SENTINEL_ALERT_WORKERS", default_value_t = 2)]
    pub alert_workers: usize,

    /// 告警队列容量, 满时丢弃新告警
    #[arg(long, env = "SENTINEL_ALERT_QUEUE", default_value_t = 16)]
    pub alert_queue: usize,

    /// 通知/记录失败重试次数
    #[arg(long, env = "SENTINEL_ALERT_RETRIES", default_value_t = 2)]
    pub alert_retries: u32,

    // ========== 推流 ==========
    /// 推流 JPEG 质量 (1-100)
    #[arg(long, env = "SENTINEL_JPEG_QUALITY", default_value_t = 80,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: u8,

    /// 打开视频流时自动启动检测
    #[arg(long, env = "SENTINEL_AUTO_START", default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_start_on_stream: bool,
}

impl Args {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            iou_threshold: self.iou_threshold,
            fire: FireConfig {
                min_area: self.fire_min_area,
                ..FireConfig::default()
            },
            cooldown: Duration::from_secs(self.cooldown_secs),
            font_path: self.font.clone(),
            ..EvaluatorConfig::default()
        }
    }

    pub fn alert_config(&self) -> AlertConfig {
        AlertConfig {
            workers: self.alert_workers,
            queue_capacity: self.alert_queue,
            retries: self.alert_retries,
            recipient: self.recipient.clone(),
            ..AlertConfig::default()
        }
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            url: self.detector_url.clone(),
            timeout: Duration::from_millis(self.detector_timeout_ms),
            inf_size: self.inf_size,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            jpeg_quality: self.jpeg_quality,
            min_confidence: self.confidence,
        }
    }

    pub fn web_config(&self) -> WebConfig {
        WebConfig {
            auto_start_on_stream: self.auto_start_on_stream,
            evidence_dir: self.evidence_dir.clone(),
        }
    }

    pub fn geocoder(&self) -> Box<dyn Geocoder> {
        match &self.opencage_key {
            Some(key) if !key.is_empty() => Box::new(OpenCageGeocoder::new(
                key.clone(),
                Duration::from_millis(self.alert_timeout_ms),
            )),
            _ => Box::new(CoordinateGeocoder),
        }
    }

    pub fn notifier(&self) -> Box<dyn Notifier> {
        match &self.webhook_url {
            Some(url) if !url.is_empty() => Box::new(WebhookNotifier::new(
                url.clone(),
                Duration::from_millis(self.alert_timeout_ms),
            )),
            _ => Box::new(LogNotifier),
        }
    }

    /// 按输入类型构造帧源工厂 (每次 start 新建一个帧源)
    pub fn source_factory(&self) -> Result<SourceFactory> {
        match self.input {
            InputKind::Images => {
                let dir = self.image_dir.clone();
                let fps = self.image_fps;
                let looping = self.loop_images;
                Ok(Box::new(move || {
                    Box::new(ImageDirSource::new(dir.clone(), fps, looping)) as Box<dyn FrameSource>
                }))
            }
            InputKind::Camera => self.stream_factory(None),
            InputKind::Rtsp => match &self.rtsp_url {
                Some(url) if !url.is_empty() => self.stream_factory(Some(url.clone())),
                _ => Err(SentinelError::Config(
                    "--rtsp-url is required for rtsp input".to_string(),
                )),
            },
        }
    }

    #[cfg(feature = "ffmpeg")]
    fn stream_factory(&self, rtsp_url: Option<String>) -> Result<SourceFactory> {
        use crate::input::{FfmpegSource, StreamInput};

        let input = match rtsp_url {
            Some(url) => StreamInput::Rtsp(url),
            None => StreamInput::Camera(self.camera_index),
        };
        Ok(Box::new(move || {
            Box::new(FfmpegSource::new(input.clone())) as Box<dyn FrameSource>
        }))
    }

    #[cfg(not(feature = "ffmpeg"))]
    fn stream_factory(&self, _rtsp_url: Option<String>) -> Result<SourceFactory> {
        Err(SentinelError::Config(format!(
            "{:?} input requires the `ffmpeg` feature",
            self.input
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["sentinel"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_match_detection_constants() {
        let args = parse(&[]);
        let evaluator = args.evaluator_config();
        assert_eq!(evaluator.iou_threshold, 0.4);
        assert_eq!(evaluator.fire.min_area, 1000.0);
        assert_eq!(evaluator.fire.lower, [10, 150, 150]);
        assert_eq!(evaluator.cooldown, Duration::from_secs(10));
        assert_eq!(args.pipeline_config().min_confidence, 0.5);
        assert!(args.auto_start_on_stream);
        assert_eq!(args.addr(), "0.0.0.0:5000");
    }

    #[test]
    fn test_sub_configs_follow_flags() {
        let args = parse(&[
            "--port",
            "8080",
            "--cooldown-secs",
            "0",
            "--alert-workers",
            "4",
            "--alert-queue",
            "1",
            "--detector-timeout-ms",
            "250",
            "--auto-start-on-stream",
            "false",
            "--latitude",
            "-33.8688",
        ]);
        assert_eq!(args.port, 8080);
        assert_eq!(args.evaluator_config().cooldown, Duration::ZERO);
        let alert = args.alert_config();
        assert_eq!(alert.workers, 4);
        assert_eq!(alert.queue_capacity, 1);
        assert_eq!(args.detector_config().timeout, Duration::from_millis(250));
        assert!(!args.web_config().auto_start_on_stream);
        assert_eq!(args.latitude, -33.8688);
    }

    #[test]
    fn test_jpeg_quality_range() {
        assert!(Args::try_parse_from(["sentinel", "--jpeg-quality", "0"]).is_err());
        assert!(Args::try_parse_from(["sentinel", "--jpeg-quality", "101"]).is_err());
        assert_eq!(parse(&["--jpeg-quality", "95"]).pipeline_config().jpeg_quality, 95);
    }

    #[test]
    fn test_image_fps_must_be_finite() {
        for bad in ["NaN", "inf", "-1", "1e9"] {
            assert!(Args::try_parse_from(["sentinel", "--image-fps", bad]).is_err(), "{bad}");
        }
        assert_eq!(parse(&["--image-fps", "0"]).image_fps, 0.0);
        assert_eq!(parse(&["--image-fps", "2.5"]).image_fps, 2.5);
    }

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn test_default_input_works_without_ffmpeg() {
        let args = parse(&[]);
        assert_eq!(args.input, InputKind::Images);
        assert!(args.source_factory().is_ok());
        assert!(matches!(
            parse(&["--input", "camera"]).source_factory(),
            Err(SentinelError::Config(_))
        ));
    }

    #[test]
    fn test_rtsp_without_url_is_config_error() {
        let args = parse(&["--input", "rtsp"]);
        assert!(matches!(args.source_factory(), Err(SentinelError::Config(_))));
    }

    #[test]
    fn test_image_factory_builds_fresh_sources() {
        let dir = tempfile::tempdir().unwrap();
        let image_dir = dir.path().to_str().unwrap();
        let args = parse(&["--input", "images", "--image-dir", image_dir]);
        let factory = args.source_factory().unwrap();
        let source = factory();
        assert!(source.describe().contains(image_dir));
    }
}
