//! Metadata backend keeping each document as one tab-indented JSON file.
//!
//! Every mutation is a read-modify-write of the whole document under that
//! document's lock, so top-level fields that are not table data (`useSql`,
//! `meta`, `tokens`, `cliKey`, ...) survive untouched. Documents are replaced
//! by writing a sibling temp file and renaming it over the original, which
//! lets readers skip the lock without ever seeing a half-written file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::backend::Backend;
use super::bootstrap;
use super::store::StoreError;
use super::tables::{DocumentId, TableId};

pub struct JsonBackend {
    data_dir: PathBuf,
    files_lock: Mutex<()>,
    users_lock: Mutex<()>,
}

impl JsonBackend {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            files_lock: Mutex::new(()),
            users_lock: Mutex::new(()),
        }
    }

    pub fn document_path(&self, document: DocumentId) -> PathBuf {
        self.data_dir.join(document.file_name())
    }

    fn lock(&self, document: DocumentId) -> &Mutex<()> {
        match document {
            DocumentId::Files => &self.files_lock,
            DocumentId::Users => &self.users_lock,
        }
    }

    /// Append `key` to the uploader's file list in the users document.
    ///
    /// Caller holds the files lock; the users lock is always taken second.
    /// The users document is written first and the files document last, so
    /// a file record only becomes visible once its ownership entry is on
    /// disk. If the files write fails the users document is restored from
    /// its snapshot.
    async fn put_owned_file(
        &self,
        files_path: &Path,
        files_doc: &Map<String, Value>,
        uploader: &str,
        key: &str,
    ) -> Result<(), StoreError> {
        let _users_guard = self.users_lock.lock().await;
        let users_path = self.document_path(DocumentId::Users);
        let (users_snapshot, mut users_doc) = read_document(&users_path).await?;

        if !record_ownership(&mut users_doc, uploader, key) {
            return write_document(files_path, files_doc).await;
        }

        write_document(&users_path, &users_doc).await?;
        if let Err(e) = write_document(files_path, files_doc).await {
            warn!(key, uploader, error = %e, "File record write failed, rolling back ownership");
            if let Err(rollback) = write_atomic(&users_path, &users_snapshot).await {
                error!(key, error = %rollback, "Failed to roll back users document");
            }
            return Err(e);
        }

        debug!(key, uploader, "Recorded file ownership");
        Ok(())
    }
}

#[async_trait]
impl Backend for JsonBackend {
    async fn open(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|source| StoreError::BackendUnavailable {
                path: self.data_dir.clone(),
                source,
            })
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn configure(&self) -> Result<(), StoreError> {
        bootstrap::ensure_documents(&self.data_dir)
            .await
            .map_err(StoreError::into_unavailable)?;

        for document in DocumentId::ALL {
            let path = self.document_path(document);
            let (_, doc) = read_document(&path).await?;
            if doc.get("useSql").and_then(Value::as_bool).unwrap_or(false) {
                warn!(
                    path = %path.display(),
                    "Document requests SQL delegation, which is not available; using JSON"
                );
            }
        }

        Ok(())
    }

    async fn put(&self, table: TableId, key: &str, value: Value) -> Result<(), StoreError> {
        let document = table.document();
        let _guard = self.lock(document).lock().await;
        let path = self.document_path(document);
        let (_, mut doc) = read_document(&path).await?;

        let sector = sector_mut(&mut doc, table.sector(), &path)?;
        if sector.contains_key(key) {
            return Err(StoreError::KeyConflict {
                table,
                key: key.to_string(),
            });
        }

        let uploader = match table {
            TableId::Files => value
                .get("uploader")
                .and_then(Value::as_str)
                .map(str::to_owned),
            TableId::Users => None,
        };
        sector.insert(key.to_string(), value);

        match uploader {
            Some(uploader) => self.put_owned_file(&path, &doc, &uploader, key).await?,
            None => write_document(&path, &doc).await?,
        }

        debug!(%table, key, "Inserted record");
        Ok(())
    }

    async fn get(&self, table: TableId, key: &str) -> Result<Option<Value>, StoreError> {
        let (_, mut doc) = read_document(&self.document_path(table.document())).await?;
        Ok(match doc.remove(table.sector()) {
            Some(Value::Object(mut sector)) => sector.remove(key),
            _ => None,
        })
    }

    async fn get_all(&self, table: TableId) -> Result<Map<String, Value>, StoreError> {
        let (_, mut doc) = read_document(&self.document_path(table.document())).await?;
        Ok(match doc.remove(table.sector()) {
            Some(Value::Object(sector)) => sector,
            _ => Map::new(),
        })
    }

    async fn cli_key(&self) -> Result<String, StoreError> {
        let path = self.document_path(DocumentId::Users);
        let (_, doc) = read_document(&path).await?;
        doc.get("cliKey")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| StoreError::Malformed {
                path,
                reason: "cliKey is missing or not a string".to_string(),
            })
    }
}

/// Read a document, returning its raw bytes alongside the parsed object.
async fn read_document(path: &Path) -> Result<(Vec<u8>, Map<String, Value>), StoreError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    let doc = serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((bytes, doc))
}

async fn write_document(path: &Path, doc: &Map<String, Value>) -> Result<(), StoreError> {
    let bytes = to_tabbed_json(doc)?;
    write_atomic(path, &bytes).await
}

/// Serialize with tab indentation.
pub(crate) fn to_tabbed_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(buf)
}

/// Replace `path` with `bytes` via a synced temp file and a rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    file.sync_all().await.map_err(|e| StoreError::io(&tmp, e))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}

fn sector_mut<'a>(
    doc: &'a mut Map<String, Value>,
    sector: &str,
    path: &Path,
) -> Result<&'a mut Map<String, Value>, StoreError> {
    let entry = doc
        .entry(sector.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if entry.is_null() {
        *entry = Value::Object(Map::new());
    }
    entry.as_object_mut().ok_or_else(|| StoreError::Malformed {
        path: path.to_path_buf(),
        reason: format!("sector `{sector}` is not an object"),
    })
}

/// Returns false when the uploader has no user record.
fn record_ownership(users_doc: &mut Map<String, Value>, uploader: &str, key: &str) -> bool {
    let Some(user) = users_doc
        .get_mut(TableId::Users.sector())
        .and_then(Value::as_object_mut)
        .and_then(|users| users.get_mut(uploader))
        .and_then(Value::as_object_mut)
    else {
        return false;
    };

    let files = user
        .entry("files")
        .or_insert_with(|| Value::Array(Vec::new()));
    match files.as_array_mut() {
        Some(list) => {
            if !list.iter().any(|v| v.as_str() == Some(key)) {
                list.push(Value::String(key.to_string()));
            }
            true
        }
        None => {
            warn!(uploader, "User record has a non-list `files` field, skipping ownership");
            false
        }
    }
}
