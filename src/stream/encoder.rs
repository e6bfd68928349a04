//! JPEG 编码

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::error::{Result, SentinelError};

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Bytes> {
    if image.width() == 0 || image.height() == 0 {
        return Err(SentinelError::Encode("empty image".into()));
    }
    let mut jpeg_bytes = Vec::with_capacity((image.width() * image.height() / 4) as usize);
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_bytes, quality.clamp(1, 100));
    encoder
        .encode_image(image)
        .map_err(|e| SentinelError::Encode(e.to_string()))?;
    Ok(Bytes::from(jpeg_bytes))
}
