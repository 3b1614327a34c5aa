use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// Slack on top of the file size for multipart framing and form fields
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.uploads.max_upload_size as usize + MULTIPART_OVERHEAD;

    Router::new()
        // Uploads
        .route(
            "/",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/:id", get(handlers::redirect_to_direct))
        .route("/direct/:id", get(handlers::serve_file))
        // Admin
        .route("/admin/users", post(handlers::register_user))
        .route("/admin/tables/:table", get(handlers::list_table))
        // Internal
        .route("/_internal/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
