mod admin;
mod files;

use axum::http::{header, HeaderMap};
use subtle::ConstantTimeEq;

use crate::api::response::ApiError;
use crate::AppState;

pub use admin::{health, list_table, register_user};
pub use files::{redirect_to_direct, serve_file, upload_file};

/// Require the bootstrap-generated admin key in the `Authorization` header.
async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v))
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    let expected = state.store.cli_key().await?;
    if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(ApiError::unauthorized("Invalid admin key"));
    }
    Ok(())
}

/// Base URL for links handed back to clients.
fn request_base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = &state.config.node.public_url {
        return url.clone();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(state.config.node.bind_address.as_str());
    format!("http://{host}")
}
