//! MJPEG 推流
//!
//! 采集线程把编码后的帧发布到广播通道, 每个 HTTP 连接一个订阅者.
//! 订阅者只接收订阅之后的帧; 跟不上时跳帧, 不会阻塞采集线程.
//! 一次运行结束时发送结束标记, 所有连接的响应体随之正常结束.

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// 分隔符
pub const MJPEG_BOUNDARY: &str = "frame";

#[derive(Clone, Debug)]
pub enum StreamItem {
    /// 一帧编码后的 JPEG
    Frame(Bytes),
    /// 本次运行结束
    End,
}

pub struct MjpegBroadcaster {
    tx: broadcast::Sender<StreamItem>,
}

impl MjpegBroadcaster {
    /// `capacity` 为慢速订阅者开始丢帧前可缓存的帧数
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// 发布一帧, 返回当前订阅者数量
    pub fn publish(&self, jpeg: Bytes) -> usize {
        self.tx.send(StreamItem::Frame(jpeg)).unwrap_or(0)
    }

    /// 通知所有订阅者本次运行结束
    pub fn close(&self) -> usize {
        self.tx.send(StreamItem::End).unwrap_or(0)
    }

    pub fn subscribe(&self) -> MjpegSubscriber {
        MjpegSubscriber {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for MjpegBroadcaster {
    fn default() -> Self {
        Self::new(4)
    }
}

/// `--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!("--{MJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut bytes = Vec::with_capacity(header.len() + jpeg.len() + 2);
    bytes.extend_from_slice(header.as_bytes());
    bytes.extend_from_slice(jpeg);
    bytes.extend_from_slice(b"\r\n");
    Bytes::from(bytes)
}

pub struct MjpegSubscriber {
    rx: broadcast::Receiver<StreamItem>,
}

impl MjpegSubscriber {
    /// multipart 分片流, 遇到结束标记或通道关闭时结束; 滞后时跳过
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, std::convert::Infallible>> {
        BroadcastStream::new(self.rx)
            .take_while(|item| !matches!(item, Ok(StreamItem::End)))
            .filter_map(|item| match item {
                Ok(StreamItem::Frame(jpeg)) => Some(Ok(multipart_part(&jpeg))),
                _ => None,
            })
    }
}

#[cfg(test)]
impl MjpegSubscriber {
    /// 已发布但尚未读取的条目数
    pub(crate) fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl IntoResponse for MjpegSubscriber {
    fn into_response(self) -> Response {
        let body = Body::from_stream(self.into_stream());
        (
            StatusCode::OK,
            [
                (
                    header::CONTENT_TYPE,
                    format!("multipart/x-mixed-replace; boundary={MJPEG_BOUNDARY}"),
                ),
                (
                    header::CACHE_CONTROL,
                    "no-cache, no-store, must-revalidate".to_string(),
                ),
                (header::PRAGMA, "no-cache".to_string()),
            ],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: &'static [u8]) -> Bytes {
        Bytes::from_static(data)
    }

    #[test]
    fn test_publish_without_subscribers() {
        let broadcaster = MjpegBroadcaster::new(4);
        assert_eq!(broadcaster.publish(frame(b"x")), 0);
        assert_eq!(broadcaster.close(), 0);
    }

    #[test]
    fn test_subscriber_count() {
        let broadcaster = MjpegBroadcaster::new(4);
        let sub1 = broadcaster.subscribe();
        let _sub2 = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);
        drop(sub1);
        assert_eq!(broadcaster.subscriber_count(), 1);
    }

    #[test]
    fn test_multipart_part_layout() {
        let part = multipart_part(b"JPEG");
        assert_eq!(&part[..], b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n");
    }

    #[tokio::test]
    async fn test_stream_ends_on_close() {
        let broadcaster = MjpegBroadcaster::new(8);
        let stream = broadcaster.subscribe().into_stream();
        broadcaster.publish(frame(b"one"));
        broadcaster.publish(frame(b"two"));
        broadcaster.close();
        broadcaster.publish(frame(b"late"));

        let parts: Vec<Bytes> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(parts, vec![multipart_part(b"one"), multipart_part(b"two")]);
    }

    #[tokio::test]
    async fn test_new_subscriber_sees_only_future_frames() {
        let broadcaster = MjpegBroadcaster::new(8);
        broadcaster.publish(frame(b"old"));
        let stream = broadcaster.subscribe().into_stream();
        broadcaster.publish(frame(b"new"));
        broadcaster.close();
        let parts: Vec<Bytes> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(parts, vec![multipart_part(b"new")]);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_frames() {
        let broadcaster = MjpegBroadcaster::new(2);
        let stream = broadcaster.subscribe().into_stream();
        for _ in 0..6 {
            broadcaster.publish(frame(b"f"));
        }
        broadcaster.close();
        let parts: Vec<Bytes> = stream.map(|r| r.unwrap()).collect().await;
        assert!(parts.len() < 6);
    }
}
