use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use super::authorize;
use crate::api::response::{ApiError, AppJson, AppQuery, JSend, PaginatedData, Pagination};
use crate::storage::models::UserRecord;
use crate::storage::{TableId, Users};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct TableEntry {
    pub key: String,
    pub record: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ListTableParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    pub username: String,
    #[serde(default)]
    pub admin: bool,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Route: GET /admin/tables/:table
pub async fn list_table(
    State(state): State<Arc<AppState>>,
    Path(table): Path<String>,
    headers: HeaderMap,
    AppQuery(params): AppQuery<ListTableParams>,
) -> Result<Json<JSend<PaginatedData<TableEntry>>>, ApiError> {
    authorize(&state, &headers).await?;

    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let table = TableId::from_str(&table)?;
    let records = state.store.get_all_raw(table).await?;

    let total = records.len() as u64;
    let mut entries: Vec<TableEntry> = records
        .into_iter()
        .map(|(key, record)| TableEntry { key, record })
        .collect();
    entries.sort_by(|a, b| a.key.cmp(&b.key));

    let items: Vec<TableEntry> = entries
        .into_iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
        .collect();

    Ok(JSend::paginated(
        items,
        Pagination {
            limit: params.limit,
            offset: params.offset,
            total,
        },
    ))
}

/// Route: POST /admin/users
pub async fn register_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(req): AppJson<RegisterUserRequest>,
) -> Result<Json<JSend<UserRecord>>, ApiError> {
    authorize(&state, &headers).await?;

    let username = req.username.trim();
    if username.is_empty() {
        return Err(ApiError::bad_request("username must not be empty"));
    }

    let user = UserRecord::new(uuid::Uuid::new_v4().to_string(), username, req.admin);
    state.store.put::<Users>(&user.id, &user).await?;

    tracing::info!(user_id = %user.id, username = %user.username, "Registered user");
    Ok(JSend::success(user))
}
