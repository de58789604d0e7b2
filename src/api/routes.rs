//! API route definitions

use super::handlers;
use crate::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // ====================================================================
        // Push side
        // ====================================================================
        .route("/webhooks/left", post(handlers::receive_webhook))
        .route("/api/push/{left_id}", post(handlers::push_document))
        // ====================================================================
        // Poll side
        // ====================================================================
        .route("/api/poll", post(handlers::trigger_poll))
        // ====================================================================
        // Mappings
        // ====================================================================
        .route("/api/mappings", get(handlers::list_mappings))
        .route(
            "/api/mappings/{left_id}",
            get(handlers::get_mapping).delete(handlers::delete_mapping),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
