use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use super::{authorize, request_base_url};
use crate::api::response::{ApiError, JSend};
use crate::object_store::{self, ObjectStoreError};
use crate::random;
use crate::storage::models::{FileRecord, SaveLocation, ANONYMOUS_UPLOADER};
use crate::storage::{Files, StoreError, Users};
use crate::AppState;

/// Attempts at finding an unused identifier before giving up
const MAX_ID_ATTEMPTS: usize = 5;

/// Random part of a blob key, keeps same-name uploads apart
const BLOB_NONCE_LENGTH: usize = 8;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: String,
    pub resource: String,
}

struct UploadedFile {
    data: Bytes,
    filename: String,
    content_type: Option<String>,
}

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<JSend<UploadResponse>>, ApiError> {
    let mut upload: Option<UploadedFile> = None;
    let mut uploader: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                if upload.is_some() {
                    return Err(ApiError::bad_request("only one file may be uploaded"));
                }
                let filename = sanitize_filename(field.file_name().unwrap_or(""));
                let content_type = field.content_type().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

                if data.len() as u64 > state.config.uploads.max_upload_size {
                    return Err(ApiError::payload_too_large(format!(
                        "File exceeds maximum upload size of {} bytes",
                        state.config.uploads.max_upload_size
                    )));
                }

                upload = Some(UploadedFile {
                    data,
                    filename,
                    content_type,
                });
            }
            "uploader" => {
                uploader = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid uploader: {e}")))?,
                );
            }
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| ApiError::bad_request("No file was provided"))?;

    // Attributing an upload to a user is an admin action
    let uploader = match uploader {
        Some(user_id) => {
            authorize(&state, &headers).await?;
            state
                .store
                .get::<Users>(&user_id)
                .await?
                .ok_or_else(|| ApiError::bad_request(format!("unknown uploader '{user_id}'")))?;
            user_id
        }
        None => ANONYMOUS_UPLOADER.to_string(),
    };

    let mimetype = upload
        .content_type
        .filter(|ct| ct != "application/octet-stream")
        .or_else(|| {
            mime_guess::from_path(&upload.filename)
                .first()
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let timestamp = Utc::now().timestamp_millis().to_string();
    let sha256 = hex::encode(ring::digest::digest(&ring::digest::SHA256, &upload.data));
    let size = upload.data.len() as u64;

    // Bytes first, metadata second
    let (file_key, save) =
        store_blob(&state, &timestamp, &upload.filename, upload.data, &mimetype).await?;

    let mut record = FileRecord {
        fakeid: String::new(),
        file_key: file_key.clone(),
        mimetype,
        filename: upload.filename,
        timestamp,
        uploader,
        save,
        sha256,
        size,
    };

    if let Err(e) = insert_with_fresh_id(&state, &mut record).await {
        if let Err(cleanup) = state.object_store.delete(&file_key).await {
            tracing::warn!(file_key = %file_key, error = %cleanup, "Failed to remove orphaned upload");
        }
        return Err(e);
    }

    tracing::debug!(
        file_id = %record.fakeid,
        file_key = %record.file_key,
        object_storage = record.save.is_object_storage(),
        "File saved"
    );

    let base = request_base_url(&state, &headers);
    Ok(JSend::success(UploadResponse {
        resource: format!("{base}/{}", record.fakeid),
        id: record.fakeid,
    }))
}

/// Store the upload bytes under a fresh `<millis>_<nonce>_<filename>` key.
async fn store_blob(
    state: &AppState,
    timestamp: &str,
    filename: &str,
    data: Bytes,
    mimetype: &str,
) -> Result<(String, SaveLocation), ApiError> {
    for attempt in 1..=MAX_ID_ATTEMPTS {
        let nonce = random::random_id(BLOB_NONCE_LENGTH);
        let file_key = format!("{timestamp}_{nonce}_{filename}");

        match state.object_store.put(&file_key, data.clone(), mimetype).await {
            Ok(save) => return Ok((file_key, save)),
            Err(ObjectStoreError::AlreadyExists(_)) => {
                tracing::debug!(file_key = %file_key, attempt, "Blob key taken, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApiError::internal("Could not allocate a unique storage key"))
}

/// Store `record` under a newly generated identifier, drawing again when the
/// identifier is already taken.
async fn insert_with_fresh_id(state: &AppState, record: &mut FileRecord) -> Result<(), ApiError> {
    for attempt in 1..=MAX_ID_ATTEMPTS {
        record.fakeid = random::random_id(state.config.uploads.id_size);

        match state.store.put::<Files>(&record.fakeid, record).await {
            Ok(()) => return Ok(()),
            Err(StoreError::KeyConflict { key, .. }) => {
                tracing::debug!(key = %key, attempt, "Identifier collision, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApiError::internal(
        "Could not allocate a unique identifier, consider a larger ID_SIZE",
    ))
}

pub async fn redirect_to_direct(Path(id): Path<String>) -> Redirect {
    Redirect::to(&format!("/direct/{id}"))
}

/// Serve file content by public identifier.
/// Route: GET /direct/:id
pub async fn serve_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let file = state
        .store
        .get::<Files>(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    let data = match (&file.save.local, file.save.is_object_storage()) {
        (Some(path), false) => object_store::read_local(std::path::Path::new(path)).await?,
        _ => state.object_store.get(&file.file_key).await?,
    };

    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        file.mimetype
            .parse()
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    if let Ok(value) = content_disposition(&file.filename).parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    // Uploads never change once stored
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    Ok(response)
}

/// `inline` disposition with an ASCII `filename` and, for names that need
/// it, the RFC 5987 `filename*` form carrying the UTF-8 original.
fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| match c {
            ' '..='~' if c != '"' && c != '\\' => c,
            _ => '_',
        })
        .collect();
    if ascii == filename {
        return format!("inline; filename=\"{ascii}\"");
    }

    let mut encoded = String::new();
    for byte in filename.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    format!("inline; filename=\"{ascii}\"; filename*=UTF-8''{encoded}")
}

/// Reduce a client supplied filename to a single safe path component.
fn sanitize_filename(raw: &str) -> String {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && *c != '"')
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "upload".to_string(),
        other => other.to_string(),
    }
}
