use async_trait::async_trait;
use serde_json::{Map, Value};

use super::store::StoreError;
use super::tables::TableId;

/// Contract every metadata persistence engine satisfies.
///
/// Operations on one instance are ordered: a `get` that starts after a `put`
/// to the same table returned observes the new record.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Acquire whatever the backend needs before use. Idempotent.
    async fn open(&self) -> Result<(), StoreError>;

    /// Release resources. Safe to call without a prior `open`.
    async fn close(&self) -> Result<(), StoreError>;

    /// First-use provisioning. Runs on every start and is a no-op when the
    /// store already holds data.
    async fn configure(&self) -> Result<(), StoreError>;

    /// Insert `value` under `key`. Never overwrites an existing record.
    async fn put(&self, table: TableId, key: &str, value: Value) -> Result<(), StoreError>;

    /// `Ok(None)` when the key is absent.
    async fn get(&self, table: TableId, key: &str) -> Result<Option<Value>, StoreError>;

    /// Every record of the table, empty when there are none.
    async fn get_all(&self, table: TableId) -> Result<Map<String, Value>, StoreError>;

    async fn cli_key(&self) -> Result<String, StoreError>;
}
