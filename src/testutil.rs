//! Shared test helpers for handler tests.

use std::sync::Arc;

use crate::config::{Config, NodeConfig, StorageConfig, UploadConfig};
use crate::object_store::LocalStore;
use crate::storage::Store;
use crate::AppState;

/// Create a test AppState with a bootstrapped store and local object store.
pub async fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let uploads_dir = temp_dir.path().join("uploads");

    let config = Config {
        node: NodeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
            public_url: Some("http://share.test".to_string()),
        },
        storage: StorageConfig::default(),
        uploads: UploadConfig {
            uploads_dir: uploads_dir.to_string_lossy().to_string(),
            max_upload_size: 1024 * 1024, // 1MB for tests
            ..Default::default()
        },
    };

    let store = Store::json(&data_dir);
    store.start().await.expect("Failed to start test store");
    let object_store = LocalStore::new(&uploads_dir).expect("Failed to create test object store");

    Arc::new(AppState {
        config,
        store,
        object_store: Arc::new(object_store),
    })
}
