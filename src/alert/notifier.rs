//! 告警通知

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde_json::json;
use tracing::info;

use crate::error::{Result, SentinelError};
use crate::events::Event;

/// 一条待发送的通知
#[derive(Clone, Debug)]
pub struct Notification {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub attachment_name: String,
    pub attachment: Bytes,
}

impl Notification {
    /// 标题: `🚨 Alert: <类型> Detected!`
    pub fn for_event(
        event: &Event,
        recipient: &str,
        location: &str,
        map_link: &str,
        jpeg: Bytes,
    ) -> Self {
        let label = event.kind.label();
        let attachment_name = event
            .image_path
            .rsplit('/')
            .next()
            .unwrap_or(event.image_path.as_str())
            .to_string();
        Self {
            recipient: recipient.to_string(),
            subject: format!("🚨 Alert: {label} Detected!"),
            body: format!(
                "An event has been detected: {label}\nLocation: {location}\nGoogle Maps: {map_link}"
            ),
            attachment_name,
            attachment: jpeg,
        }
    }
}

/// 通知通道 (同步发送, 失败以 Err 返回)
pub trait Notifier: Send + Sync {
    fn send(&self, notification: &Notification) -> Result<()>;
}

/// JSON Webhook, 附件 base64 编码
pub struct WebhookNotifier {
    agent: ureq::Agent,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            url: url.into(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn send(&self, n: &Notification) -> Result<()> {
        let payload = json!({
            "recipient": n.recipient,
            "subject": n.subject,
            "body": n.body,
            "attachment": {
                "filename": n.attachment_name,
                "contentType": "image/jpeg",
                "data": STANDARD.encode(&n.attachment),
            },
        });
        self.agent
            .post(&self.url)
            .send_json(payload)
            .map_err(|e| SentinelError::NotifyFailure(e.to_string()))?;
        Ok(())
    }
}

/// 未配置 Webhook 时只写日志
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, n: &Notification) -> Result<()> {
        info!(
            "📨 [{}] {} | {} | 附件 {} ({} bytes)",
            n.recipient,
            n.subject,
            n.body.replace('\n', " | "),
            n.attachment_name,
            n.attachment.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;
    use crate::events::EventKind;
    use chrono::{Local, TimeZone};

    #[test]
    fn test_notification_format() {
        let ts = Local.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let event = Event::new(1, EventKind::Fire, BBox::default(), ts, None);
        let n = Notification::for_event(
            &event,
            "ops@example.com",
            "MG Road",
            "https://www.google.com/maps?q=1,2",
            Bytes::from_static(b"jpg"),
        );
        assert_eq!(n.subject, "🚨 Alert: Car on Fire Detected!");
        assert_eq!(
            n.body,
            "An event has been detected: Car on Fire\nLocation: MG Road\nGoogle Maps: https://www.google.com/maps?q=1,2"
        );
        assert_eq!(n.attachment_name, "fire_20240501_083000.jpg");
        assert!(LogNotifier.send(&n).is_ok());
    }
}
