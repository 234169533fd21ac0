//! HTTP surface: a single `POST /` route receiving GitHub deliveries.

pub mod webhook;

use axum::{Router, extract::DefaultBodyLimit, routing};
use tower_http::trace::TraceLayer;

use crate::SharedState;

pub use webhook::handle_webhook;

/// GitHub caps webhook payloads at 25 MB.
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", routing::post(handle_webhook))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
