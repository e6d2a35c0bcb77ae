pub mod alerts;
pub mod engine;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the complete API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(engine::router())
        .merge(alerts::router())
        .with_state(state)
}
