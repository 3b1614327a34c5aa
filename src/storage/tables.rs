use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::models::{FileRecord, UserRecord};
use super::store::StoreError;

/// Physical JSON documents kept in the data directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentId {
    Files,
    Users,
}

impl DocumentId {
    pub const ALL: [DocumentId; 2] = [DocumentId::Files, DocumentId::Users];

    pub fn file_name(self) -> &'static str {
        match self {
            DocumentId::Files => "files.json",
            DocumentId::Users => "users.json",
        }
    }
}

/// Logical tables. Each one lives in a named sector of exactly one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableId {
    Files,
    Users,
}

impl TableId {
    pub const ALL: [TableId; 2] = [TableId::Files, TableId::Users];

    pub fn name(self) -> &'static str {
        match self {
            TableId::Files => "files",
            TableId::Users => "users",
        }
    }

    pub fn document(self) -> DocumentId {
        match self {
            TableId::Files => DocumentId::Files,
            TableId::Users => DocumentId::Users,
        }
    }

    /// Top-level key of the document holding this table's records
    pub fn sector(self) -> &'static str {
        match self {
            TableId::Files => "files",
            TableId::Users => "users",
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TableId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableId::ALL
            .into_iter()
            .find(|table| table.name() == s)
            .ok_or_else(|| StoreError::UnknownTable(s.to_string()))
    }
}

/// A table together with the record shape stored in it.
pub trait Table {
    const ID: TableId;
    type Record: Serialize + DeserializeOwned + Send + Sync;
}

/// Uploaded file metadata, keyed by public identifier
pub struct Files;

/// User accounts, keyed by user id
pub struct Users;

impl Table for Files {
    const ID: TableId = TableId::Files;
    type Record = FileRecord;
}

impl Table for Users {
    const ID: TableId = TableId::Users;
    type Record = UserRecord;
}
