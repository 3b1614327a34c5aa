//! fileshare - a self-hosted file sharing service
//!
//! Uploads are stored on the local filesystem or in S3-compatible object
//! storage and served back under a short random identifier. Metadata lives in
//! a flat-file JSON store:
//! - `files.json` holds upload records, `users.json` holds accounts, tokens and
//!   the generated admin key
//! - every write is a locked read-modify-write of the whole document, replaced
//!   atomically on disk
//! - keys are insert-only; a duplicate key is a conflict, never an overwrite

pub mod api;
pub mod config;
pub mod object_store;
pub mod random;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use std::sync::Arc;

use config::Config;
use storage::Store;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub object_store: Arc<dyn object_store::ObjectStore>,
}
