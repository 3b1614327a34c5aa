use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Uploader id recorded when an upload is not attributed to a registered user.
pub const ANONYMOUS_UPLOADER: &str = "0";

/// Where the bytes of an upload were put.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveLocation {
    /// Path on the local filesystem
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<String>,
    /// Set when the bytes live in object storage under the record's file key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<bool>,
}

impl SaveLocation {
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            local: Some(path.into()),
            s3: None,
        }
    }

    pub fn object_storage() -> Self {
        Self {
            local: None,
            s3: Some(true),
        }
    }

    pub fn is_object_storage(&self) -> bool {
        self.s3.unwrap_or(false)
    }
}

/// Metadata of an uploaded file. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Public identifier, also the record key
    pub fakeid: String,
    /// Key of the bytes in the object store
    pub file_key: String,
    pub mimetype: String,
    /// Original filename as sent by the client
    pub filename: String,
    /// Upload time, milliseconds since the Unix epoch
    pub timestamp: String,
    pub uploader: String,
    pub save: SaveLocation,
    /// Hex-encoded SHA-256 of the content
    pub sha256: String,
    pub size: u64,
}

/// A registered user.
///
/// Fields this crate does not know about are kept in `extra` so records written
/// by other tools survive a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub admin: bool,
    /// Keys of the files this user uploaded
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserRecord {
    pub fn new(id: impl Into<String>, username: impl Into<String>, admin: bool) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            admin,
            files: Vec::new(),
            meta: Map::new(),
            extra: Map::new(),
        }
    }
}
