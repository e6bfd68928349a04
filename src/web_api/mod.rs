//! HTTP 接口
//!
//! 视频流 / 状态查询 / 启停控制 / 告警汇总 / 证据图片 / 健康检查.
//! 启停是阻塞调用, 在 `spawn_blocking` 中执行.

pub mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::{Result, SentinelError};
use crate::pipeline::{Pipeline, PipelineState};

pub use routes::create_router;

#[derive(Clone, Debug)]
pub struct WebConfig {
    /// 打开视频流时自动启动检测
    pub auto_start_on_stream: bool,
    /// 证据图片根目录, 挂载在 /evidence
    pub evidence_dir: PathBuf,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            auto_start_on_stream: true,
            evidence_dir: PathBuf::from("evidence"),
        }
    }
}

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub config: Arc<WebConfig>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, config: WebConfig) -> Self {
        Self {
            pipeline,
            config: Arc::new(config),
        }
    }
}

/// 启停接口的返回体
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub pipeline: PipelineState,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pipeline: state.pipeline.state(),
    })
}

/// 在阻塞线程池上执行生命周期调用
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SentinelError::Io(std::io::Error::other(e)))?
}
