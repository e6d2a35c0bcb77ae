//! Local alert feed endpoints.

use axum::extract::{Path, State};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde_json::json;

use herald_common::error::AppError;
use herald_notifier::local::LocalAlert;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/alerts", get(list_alerts))
        .route("/api/alerts/{tag}", delete(dismiss_alert))
}

/// Pending alerts, oldest first. Expired auto-close entries are dropped.
async fn list_alerts(State(state): State<AppState>) -> Json<Vec<LocalAlert>> {
    Json(state.local_alerts.alerts())
}

async fn dismiss_alert(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if state.local_alerts.dismiss(&tag) {
        Ok(Json(json!({ "dismissed": true })))
    } else {
        Err(AppError::NotFound(format!("Alert {} not found", tag)))
    }
}
