use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::pubsub_handler;

/// Pub/Sub caps messages at 10 MB; base64 and the JSON envelope add about a third.
const MAX_PUSH_BODY_BYTES: usize = 14 * 1024 * 1024;

/// Shared application state injected into handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Routes messages to API handlers.
    pub dispatcher: Dispatcher,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "tentacles-connector",
            "version": env!("CARGO_PKG_VERSION"),
            "project": state.config.gcp_project_id,
        })),
    )
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    let push_routes = Router::new()
        .route("/", post(pubsub_handler::pubsub_push))
        .route("/pubsub/push", post(pubsub_handler::pubsub_push))
        .layer(
            ServiceBuilder::new()
                // Replace axum's 2 MB default with the Pub/Sub-sized limit
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(MAX_PUSH_BODY_BYTES)),
        );

    Router::new()
        .route("/health", get(health))
        .merge(push_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
