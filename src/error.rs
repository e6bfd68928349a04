//! 错误类型 (Error taxonomy)
//!
//! 采集/推理错误会结束当前运行, 告警错误只在告警线程内部消化.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, SentinelError>;

#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    /// 摄像头无法打开 (start() 直接返回给调用方)
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// 视频流结束 (非致命, 流水线平滑停止)
    #[error("Stream ended")]
    StreamEnded,

    #[error("Detector failure: {0}")]
    DetectorFailure(String),

    #[error("Tracker failure: {0}")]
    TrackerFailure(String),

    /// 逆地理编码失败, 由 LocationResolver 替换为哨兵字符串
    #[error("Geocode failure: {0}")]
    GeocodeFailure(String),

    #[error("Notify failure: {0}")]
    NotifyFailure(String),

    #[error("Persist failure: {0}")]
    PersistFailure(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for SentinelError {
    fn into_response(self) -> Response {
        // 启停/推流失败统一视为服务暂不可用
        let status = StatusCode::SERVICE_UNAVAILABLE;

        tracing::error!(status = %status, message = %self, "Request error");

        let body = Json(json!({
            "success": false,
            "message": self.to_string()
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_unavailable_maps_to_503() {
        let response = SentinelError::DeviceUnavailable("camera 0".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
