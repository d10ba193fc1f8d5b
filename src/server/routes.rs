//! Route table for the Warden HTTP surface.

use axum::{
    routing::{get, post},
    Router,
};

use crate::server::handlers::{
    health_handler, heartbeat_handler, key_exchange_handler, AppState,
};

/// Build the application router with all routes wired to `state`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/key-exchange", post(key_exchange_handler))
        .route("/heartbeat", post(heartbeat_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}
