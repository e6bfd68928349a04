//! API Routes

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{services::ServeDir, trace::TraceLayer};

use super::{run_blocking, ActionResponse, AppState};
use crate::error::SentinelError;
use crate::events::Event;
use crate::pipeline::PipelineState;
use crate::status::{AlertSummary, Status};

/// `/api/events` 默认条数
const DEFAULT_EVENT_LIMIT: usize = 20;

pub fn create_router(state: AppState) -> Router {
    let evidence = ServeDir::new(&state.config.evidence_dir);

    Router::new()
        // Health
        .route("/health", get(super::health_check))
        // Stream & Status
        .route("/video_feed", get(video_feed))
        .route("/api/status", get(get_status))
        // Lifecycle
        .route("/start_detection", post(start_detection))
        .route("/stop_detection", post(stop_detection))
        // Alerts
        .route("/api/alerts", get(get_alerts))
        .route("/api/events", get(list_events))
        .nest_service("/evidence", evidence)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ========== Stream ==========

async fn video_feed(State(state): State<AppState>) -> Response {
    // 先订阅, 不丢启动后的第一帧
    let subscriber = state.pipeline.services().stream.subscribe();

    if state.config.auto_start_on_stream && state.pipeline.state() == PipelineState::Idle {
        let pipeline = state.pipeline.clone();
        if let Err(e) = run_blocking(move || pipeline.start()).await {
            return e.into_response();
        }
    }

    subscriber.into_response()
}

async fn get_status(State(state): State<AppState>) -> Json<Status> {
    Json(state.pipeline.services().status.read())
}

// ========== Lifecycle ==========

async fn start_detection(
    State(state): State<AppState>,
) -> Result<Json<ActionResponse>, SentinelError> {
    let pipeline = state.pipeline.clone();
    let outcome = run_blocking(move || pipeline.start()).await?;
    Ok(ActionResponse::ok(outcome.message()))
}

async fn stop_detection(
    State(state): State<AppState>,
) -> Result<Json<ActionResponse>, SentinelError> {
    let pipeline = state.pipeline.clone();
    let outcome = run_blocking(move || Ok(pipeline.stop())).await?;
    Ok(ActionResponse::ok(outcome.message()))
}

// ========== Alerts ==========

async fn get_alerts(State(state): State<AppState>) -> Json<AlertSummary> {
    Json(state.pipeline.services().history.summary())
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
}

async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<Event>> {
    let history = &state.pipeline.services().history;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENT_LIMIT)
        .min(history.capacity());
    Json(history.recent(limit))
}
