/// 推流输出 (JPEG 编码 + MJPEG 广播)
pub mod encoder;
pub mod mjpeg;

pub use encoder::encode_jpeg;
pub use mjpeg::{multipart_part, MjpegBroadcaster, MjpegSubscriber, StreamItem, MJPEG_BOUNDARY};
