use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use super::backend::Backend;
use super::json::JsonBackend;
use super::tables::{Table, TableId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),
    #[error("Key {key} already exists in table {table}")]
    KeyConflict { table: TableId, key: String },
    #[error("IO error on {}: {source}", .path.display())]
    StorageIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Corrupt document {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Malformed document {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Backend unavailable at {}: {source}", .path.display())]
    BackendUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        StoreError::StorageIo {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Read, parse or write failure of a document on disk.
    pub fn is_storage_io(&self) -> bool {
        matches!(
            self,
            StoreError::StorageIo { .. } | StoreError::Corrupt { .. } | StoreError::Malformed { .. }
        )
    }

    /// Re-classify a provisioning failure as the backend being unusable.
    pub(crate) fn into_unavailable(self) -> Self {
        match self {
            StoreError::StorageIo { path, source } => StoreError::BackendUnavailable { path, source },
            other => other,
        }
    }
}

/// Process-wide handle to the metadata store.
///
/// Build one in `main`, call [`Store::start`] once, and share clones of it;
/// all clones talk to the same backend. The backend is never swapped after
/// startup.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn Backend>,
}

impl Store {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Store backed by JSON documents in `data_dir`
    pub fn json<P: AsRef<Path>>(data_dir: P) -> Self {
        Self::new(Arc::new(JsonBackend::new(data_dir)))
    }

    /// Open the backend and provision it for first use.
    pub async fn start(&self) -> Result<(), StoreError> {
        self.backend.open().await?;
        self.backend.configure().await
    }

    pub async fn close(&self) -> Result<(), StoreError> {
        self.backend.close().await
    }

    /// Insert a new record. Fails with [`StoreError::KeyConflict`] if `key` is taken.
    pub async fn put<T: Table>(&self, key: &str, record: &T::Record) -> Result<(), StoreError> {
        let value = serde_json::to_value(record)?;
        self.backend.put(T::ID, key, value).await
    }

    pub async fn get<T: Table>(&self, key: &str) -> Result<Option<T::Record>, StoreError> {
        match self.backend.get(T::ID, key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn get_all<T: Table>(&self) -> Result<HashMap<String, T::Record>, StoreError> {
        self.backend
            .get_all(T::ID)
            .await?
            .into_iter()
            .map(|(key, value)| -> Result<_, StoreError> {
                Ok((key, serde_json::from_value(value)?))
            })
            .collect()
    }

    /// Untyped listing, for callers that pick the table at runtime
    pub async fn get_all_raw(&self, table: TableId) -> Result<Map<String, Value>, StoreError> {
        self.backend.get_all(table).await
    }

    /// Shared secret generated at bootstrap, used to authenticate admin calls
    pub async fn cli_key(&self) -> Result<String, StoreError> {
        self.backend.cli_key().await
    }
}
