//! Engine lifecycle and notification-history endpoints.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use herald_common::error::AppError;
use herald_engine::scheduler::{SchedulerStatus, TickReport};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/engine/status", get(engine_status))
        .route("/api/engine/start", post(start_engine))
        .route("/api/engine/stop", post(stop_engine))
        .route("/api/engine/check", post(run_check))
        .route("/api/notifications/reset", post(reset_all_notifications))
        .route(
            "/api/notifications/{task_id}/reset",
            post(reset_task_notifications),
        )
        .route("/api/webhook/test", post(test_webhook))
}

async fn engine_status(State(state): State<AppState>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status())
}

/// Start periodic checks. Returns 403 when a channel denies authorization.
async fn start_engine(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.scheduler.start().await?;
    Ok(Json(json!({ "started": true })))
}

async fn stop_engine(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.scheduler.stop();
    Json(json!({ "stopped": true }))
}

/// Run one sweep immediately and return its report.
async fn run_check(State(state): State<AppState>) -> Json<TickReport> {
    Json(state.scheduler.check_now().await)
}

async fn reset_all_notifications(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.scheduler.reset_all_notifications().await?;
    Ok(Json(json!({ "reset": true })))
}

async fn reset_task_notifications(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.scheduler.reset_task_notifications(&task_id).await?;
    Ok(Json(json!({ "reset": true, "task_id": task_id })))
}

/// Fire a test message at the configured webhook.
async fn test_webhook(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let Some(webhook) = &state.webhook else {
        return Err(AppError::Validation("webhook is not configured".to_string()));
    };
    webhook.send_test().await?;
    Ok(Json(json!({ "sent": true })))
}
