//! Service status endpoints

use axum::{Json, extract::State as AxumState, response::IntoResponse};
use serde_json::json;

use crate::SharedState;

pub async fn root() -> &'static str {
    "nexus-gitlab-stand webhook receiver"
}

/// GET /queue-status - Release queue depth and worker activity
pub async fn queue_status(AxumState(state): AxumState<SharedState>) -> impl IntoResponse {
    Json(json!({
        "queue_size": state.queue.depth(),
        "is_processing": state.queue.is_processing(),
    }))
}

/// GET /status - Server information
pub async fn status(AxumState(state): AxumState<SharedState>) -> impl IntoResponse {
    Json(json!({
        "server": {
            "name": "nexus_gitlab_stand",
            "version": env!("CARGO_PKG_VERSION"),
            "started_at": state.started_at,
            "uptime_seconds": state.start_time.elapsed().as_secs(),
        },
        "queue": {
            "queue_size": state.queue.depth(),
            "is_processing": state.queue.is_processing(),
        },
        "signature_check": state.config.webhook_secret.is_some(),
    }))
}
