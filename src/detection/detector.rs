// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测器 (Detector)
//! 职责: Frame → 缩放到推理尺寸 → 推理服务 → 还原到原图坐标的检测框

use std::time::{Duration, Instant};

use fast_image_resize as fr;
use image::RgbImage;
use serde::Deserialize;
use tracing::debug;

use super::types::{BBox, Detection, Frame, INF_SIZE};
use crate::error::{Result, SentinelError};
use crate::stream::encode_jpeg;

/// 目标检测器 Trait
///
/// 每次调用独立, 不保留跨帧身份. 返回所有类别, 过滤由调用方完成.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

// ========== HTTP 推理服务 ==========

/// 推理服务返回格式
/// `{"detections":[{"box":[x1,y1,x2,y2],"confidence":0.9,"class_id":2}]}`
#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    detections: Vec<RawDetection>,
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    #[serde(rename = "box")]
    bbox: [f32; 4],
    confidence: f32,
    class_id: u32,
}

/// 推理服务连接参数
#[derive(Clone, Debug)]
pub struct DetectorConfig {
    pub url: String,
    pub timeout: Duration,
    /// 推理输入边长
    pub inf_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9000/detect".to_string(),
            timeout: Duration::from_secs(5),
            inf_size: INF_SIZE,
        }
    }
}

/// 远程 YOLO 推理服务检测器
///
/// 帧先缩放到 `inf_size x inf_size` 并编码为 JPEG, POST 到推理服务,
/// 返回的框在推理尺寸坐标系, 这里还原到原图.
pub struct HttpDetector {
    agent: ureq::Agent,
    url: String,
    inf_size: u32,
    jpeg_quality: u8,
    resizer: fr::Resizer,

    // 统计
    count: u64,
    last: Instant,
}

impl HttpDetector {
    pub fn new(url: impl Into<String>, timeout: Duration, inf_size: u32) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            url: url.into(),
            inf_size,
            jpeg_quality: 90,
            resizer: fr::Resizer::new(),
            count: 0,
            last: Instant::now(),
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.url.clone(), config.timeout, config.inf_size)
    }

    /// 缩放到推理尺寸 (Bilinear)
    fn resize(&mut self, image: &RgbImage) -> Result<RgbImage> {
        let size = self.inf_size;
        let src = fr::images::Image::from_vec_u8(
            image.width(),
            image.height(),
            image.as_raw().clone(),
            fr::PixelType::U8x3,
        )
        .map_err(|e| SentinelError::DetectorFailure(format!("resize source: {e}")))?;
        let mut dst = fr::images::Image::new(size, size, fr::PixelType::U8x3);

        self.resizer
            .resize(
                &src,
                &mut dst,
                &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(
                    fr::FilterType::Bilinear,
                )),
            )
            .map_err(|e| SentinelError::DetectorFailure(format!("resize: {e}")))?;

        RgbImage::from_raw(size, size, dst.buffer().to_vec())
            .ok_or_else(|| SentinelError::DetectorFailure("resized buffer size mismatch".into()))
    }

    fn update_fps(&mut self) {
        self.count += 1;
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            debug!("📊 推理 FPS {:.1}", self.count as f64 / elapsed);
            self.count = 0;
            self.last = Instant::now();
        }
    }
}

impl Detector for HttpDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Vec::new());
        }
        let t0 = Instant::now();

        let resized = self.resize(&frame.image)?;
        let body = encode_jpeg(&resized, self.jpeg_quality)?;

        let response = self
            .agent
            .post(&self.url)
            .set("Content-Type", "image/jpeg")
            .send_bytes(&body)
            .map_err(|e| SentinelError::DetectorFailure(format!("inference request: {e}")))?;
        let text = response
            .into_string()
            .map_err(|e| SentinelError::DetectorFailure(format!("inference body: {e}")))?;

        let detections = parse_response(&text, self.inf_size, frame.width(), frame.height())?;
        self.update_fps();
        debug!(
            "检测 seq={} 目标={} 耗时={:.1}ms",
            frame.seq,
            detections.len(),
            t0.elapsed().as_secs_f64() * 1000.0
        );
        Ok(detections)
    }
}

/// 解析推理服务响应, 并把框从推理尺寸还原到原图尺寸
pub fn parse_response(
    text: &str,
    inf_size: u32,
    frame_width: u32,
    frame_height: u32,
) -> Result<Vec<Detection>> {
    let response: InferenceResponse = serde_json::from_str(text)
        .map_err(|e| SentinelError::DetectorFailure(format!("bad inference response: {e}")))?;

    let sx = frame_width as f32 / inf_size as f32;
    let sy = frame_height as f32 / inf_size as f32;
    let max_x = frame_width as f32;
    let max_y = frame_height as f32;

    Ok(response
        .detections
        .into_iter()
        .map(|raw| {
            let [x1, y1, x2, y2] = raw.bbox;
            let bbox = BBox::new(x1, y1, x2, y2).scale(sx, sy);
            Detection {
                bbox: BBox::new(
                    bbox.x1.clamp(0.0, max_x),
                    bbox.y1.clamp(0.0, max_y),
                    bbox.x2.clamp(0.0, max_x),
                    bbox.y2.clamp(0.0, max_y),
                ),
                confidence: raw.confidence,
                class_id: raw.class_id,
            }
        })
        .collect())
}
