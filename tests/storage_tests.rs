use std::path::PathBuf;
use std::sync::Arc;

use fileshare::storage::models::{FileRecord, SaveLocation, UserRecord, ANONYMOUS_UPLOADER};
use fileshare::storage::{
    Backend, DocumentId, Files, JsonBackend, Store, StoreError, TableId, Users, CLI_KEY_LENGTH,
};
use serde_json::json;

async fn test_store() -> (tempfile::TempDir, Store, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let store = Store::json(&data_dir);
    store.start().await.unwrap();
    (dir, store, data_dir)
}

fn sample_file(id: &str, filename: &str, size: u64) -> FileRecord {
    FileRecord {
        fakeid: id.to_string(),
        file_key: format!("1700000000000_{filename}"),
        mimetype: "image/png".to_string(),
        filename: filename.to_string(),
        timestamp: "1700000000000".to_string(),
        uploader: ANONYMOUS_UPLOADER.to_string(),
        save: SaveLocation::local(format!("uploads/1700000000000_{filename}")),
        sha256: "0".repeat(64),
        size,
    }
}

fn read_json(path: &std::path::Path) -> serde_json::Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

// ============================================================================
// Bootstrap
// ============================================================================

#[tokio::test]
async fn test_fresh_environment_has_empty_tables() {
    let (_dir, store, _) = test_store().await;

    assert!(store.get_all::<Files>().await.unwrap().is_empty());
    assert!(store.get_all::<Users>().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bootstrap_writes_seed_documents() {
    let (_dir, store, data_dir) = test_store().await;

    let files = read_json(&data_dir.join("files.json"));
    assert_eq!(files, json!({ "files": {}, "useSql": false, "meta": {} }));

    let users = read_json(&data_dir.join("users.json"));
    assert_eq!(users["tokens"], json!([]));
    assert_eq!(users["users"], json!({}));
    assert_eq!(users["useSql"], json!(false));
    assert_eq!(users["meta"], json!({}));

    let cli_key = store.cli_key().await.unwrap();
    assert_eq!(cli_key.len(), CLI_KEY_LENGTH);
    assert_eq!(users["cliKey"], json!(cli_key));
}

#[tokio::test]
async fn test_documents_are_tab_indented() {
    let (_dir, _store, data_dir) = test_store().await;

    let text = std::fs::read_to_string(data_dir.join("files.json")).unwrap();
    assert!(text.contains("\n\t\"files\""));
}

#[tokio::test]
async fn test_bootstrap_is_idempotent() {
    let (_dir, store, data_dir) = test_store().await;
    let files_before = std::fs::read(data_dir.join("files.json")).unwrap();
    let users_before = std::fs::read(data_dir.join("users.json")).unwrap();

    store.start().await.unwrap();

    assert_eq!(std::fs::read(data_dir.join("files.json")).unwrap(), files_before);
    assert_eq!(std::fs::read(data_dir.join("users.json")).unwrap(), users_before);
}

#[tokio::test]
async fn test_bootstrap_never_resets_existing_data() {
    let (_dir, store, data_dir) = test_store().await;
    store
        .put::<Files>("abc123", &sample_file("abc123", "cat.png", 204800))
        .await
        .unwrap();
    let cli_key = store.cli_key().await.unwrap();

    // A new store over the same directory, as on process restart
    let restarted = Store::json(&data_dir);
    restarted.start().await.unwrap();

    assert!(restarted.get::<Files>("abc123").await.unwrap().is_some());
    assert_eq!(restarted.cli_key().await.unwrap(), cli_key);
}

#[tokio::test]
async fn test_bootstrap_leaves_foreign_documents_alone() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();
    std::fs::write(data_dir.join("files.json"), b"{\"legacy\": true}").unwrap();

    let store = Store::json(&data_dir);
    store.start().await.unwrap();

    assert_eq!(
        std::fs::read(data_dir.join("files.json")).unwrap(),
        b"{\"legacy\": true}"
    );
    // No sector yet: reads see an empty table
    assert!(store.get_all::<Files>().await.unwrap().is_empty());
    assert!(store.get::<Files>("x").await.unwrap().is_none());
}

#[tokio::test]
async fn test_open_fails_when_directory_cannot_be_created() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let store = Store::json(blocker.join("data"));
    let err = store.start().await.unwrap_err();
    assert!(matches!(err, StoreError::BackendUnavailable { .. }));
}

// ============================================================================
// put / get / get_all
// ============================================================================

#[tokio::test]
async fn test_put_and_get_file() {
    let (_dir, store, _) = test_store().await;
    let file = sample_file("abc123", "cat.png", 204800);

    store.put::<Files>("abc123", &file).await.unwrap();

    let retrieved = store
        .get::<Files>("abc123")
        .await
        .unwrap()
        .expect("file should exist");
    assert_eq!(retrieved, file);
}

#[tokio::test]
async fn test_get_missing_key_is_none() {
    let (_dir, store, _) = test_store().await;

    assert!(store.get::<Files>("nonexistent").await.unwrap().is_none());
    assert!(store.get::<Users>("nonexistent").await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_key_conflicts_and_keeps_original() {
    let (_dir, store, _) = test_store().await;
    let original = sample_file("abc123", "cat.png", 204800);
    store.put::<Files>("abc123", &original).await.unwrap();

    let err = store
        .put::<Files>("abc123", &sample_file("abc123", "dog.png", 1))
        .await
        .unwrap_err();
    match err {
        StoreError::KeyConflict { table, key } => {
            assert_eq!(table, TableId::Files);
            assert_eq!(key, "abc123");
        }
        other => panic!("expected KeyConflict, got {other:?}"),
    }

    let stored = store.get::<Files>("abc123").await.unwrap().unwrap();
    assert_eq!(stored, original);
    assert_eq!(store.get_all::<Files>().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_file_scenario() {
    let (_dir, store, _) = test_store().await;
    let file = sample_file("abc123", "cat.png", 204800);
    store.put::<Files>("abc123", &file).await.unwrap();

    let got = store.get::<Files>("abc123").await.unwrap().unwrap();
    assert_eq!(got.filename, "cat.png");
    assert_eq!(got.size, 204800);

    let all = store.get_all::<Files>().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all.get("abc123"), Some(&file));

    assert!(matches!(
        store.put::<Files>("abc123", &file).await,
        Err(StoreError::KeyConflict { .. })
    ));
}

#[tokio::test]
async fn test_get_all_returns_every_insert() {
    let (_dir, store, _) = test_store().await;
    for i in 0..5 {
        let id = format!("id{i}");
        store
            .put::<Files>(&id, &sample_file(&id, "f.bin", i))
            .await
            .unwrap();
    }

    let all = store.get_all::<Files>().await.unwrap();
    assert_eq!(all.len(), 5);
    for i in 0..5 {
        assert_eq!(all[&format!("id{i}")].size, i);
    }
}

#[tokio::test]
async fn test_tables_are_independent() {
    let (_dir, store, _) = test_store().await;
    store
        .put::<Users>("same", &UserRecord::new("same", "alice", false))
        .await
        .unwrap();
    store
        .put::<Files>("same", &sample_file("same", "a.png", 1))
        .await
        .unwrap();

    assert_eq!(store.get_all::<Users>().await.unwrap().len(), 1);
    assert_eq!(store.get_all::<Files>().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_put_preserves_auxiliary_fields() {
    let (_dir, store, data_dir) = test_store().await;
    let users_path = data_dir.join("users.json");

    let mut doc = read_json(&users_path);
    doc["meta"] = json!({ "note": "keep me" });
    doc["tokens"] = json!(["t1", "t2"]);
    doc["extension"] = json!({ "enabled": true });
    std::fs::write(&users_path, serde_json::to_vec(&doc).unwrap()).unwrap();

    store
        .put::<Users>("u1", &UserRecord::new("u1", "alice", true))
        .await
        .unwrap();

    let after = read_json(&users_path);
    assert_eq!(after["meta"], json!({ "note": "keep me" }));
    assert_eq!(after["tokens"], json!(["t1", "t2"]));
    assert_eq!(after["extension"], json!({ "enabled": true }));
    assert_eq!(after["cliKey"], doc["cliKey"]);
    assert_eq!(after["useSql"], json!(false));
    assert_eq!(after["users"]["u1"]["username"], json!("alice"));
}

#[tokio::test]
async fn test_user_record_keeps_unknown_fields() {
    let (_dir, store, _) = test_store().await;
    let mut user = UserRecord::new("u1", "alice", false);
    user.extra
        .insert("passwordHash".to_string(), json!("$argon2id$..."));
    store.put::<Users>("u1", &user).await.unwrap();

    let got = store.get::<Users>("u1").await.unwrap().unwrap();
    assert_eq!(got, user);
    assert_eq!(got.extra["passwordHash"], json!("$argon2id$..."));
}

#[tokio::test]
async fn test_get_all_raw_by_table_name() {
    let (_dir, store, _) = test_store().await;
    store
        .put::<Files>("abc123", &sample_file("abc123", "cat.png", 204800))
        .await
        .unwrap();

    let table: TableId = "files".parse().unwrap();
    let raw = store.get_all_raw(table).await.unwrap();
    assert_eq!(raw["abc123"]["filename"], json!("cat.png"));
    assert_eq!(raw["abc123"]["fileKey"], json!("1700000000000_cat.png"));
    assert_eq!(raw["abc123"]["save"], json!({ "local": "uploads/1700000000000_cat.png" }));

    assert!(matches!(
        "tokens".parse::<TableId>(),
        Err(StoreError::UnknownTable(name)) if name == "tokens"
    ));
}

// ============================================================================
// Ownership bookkeeping across documents
// ============================================================================

#[tokio::test]
async fn test_file_insert_records_ownership() {
    let (_dir, store, _) = test_store().await;
    store
        .put::<Users>("u1", &UserRecord::new("u1", "alice", false))
        .await
        .unwrap();

    let mut file = sample_file("f1", "a.png", 10);
    file.uploader = "u1".to_string();
    store.put::<Files>("f1", &file).await.unwrap();

    let mut file = sample_file("f2", "b.png", 20);
    file.uploader = "u1".to_string();
    store.put::<Files>("f2", &file).await.unwrap();

    let user = store.get::<Users>("u1").await.unwrap().unwrap();
    assert_eq!(user.files, vec!["f1".to_string(), "f2".to_string()]);
}

#[tokio::test]
async fn test_anonymous_upload_leaves_users_untouched() {
    let (_dir, store, data_dir) = test_store().await;
    let users_before = std::fs::read(data_dir.join("users.json")).unwrap();

    store
        .put::<Files>("f1", &sample_file("f1", "a.png", 10))
        .await
        .unwrap();

    assert_eq!(std::fs::read(data_dir.join("users.json")).unwrap(), users_before);
}

#[tokio::test]
async fn test_failed_ownership_write_stores_nothing() {
    let (_dir, store, data_dir) = test_store().await;
    store
        .put::<Users>("u1", &UserRecord::new("u1", "alice", false))
        .await
        .unwrap();
    let files_before = std::fs::read(data_dir.join("files.json")).unwrap();
    let users_before = std::fs::read(data_dir.join("users.json")).unwrap();

    // A directory where the users temp file goes makes that write fail
    std::fs::create_dir(data_dir.join("users.json.tmp")).unwrap();

    let mut file = sample_file("f1", "a.png", 10);
    file.uploader = "u1".to_string();
    let err = store.put::<Files>("f1", &file).await.unwrap_err();
    assert!(err.is_storage_io());

    assert_eq!(std::fs::read(data_dir.join("files.json")).unwrap(), files_before);
    assert_eq!(std::fs::read(data_dir.join("users.json")).unwrap(), users_before);
    assert!(store.get::<Files>("f1").await.unwrap().is_none());

    // Once the obstruction is gone the same key can be inserted
    std::fs::remove_dir(data_dir.join("users.json.tmp")).unwrap();
    store.put::<Files>("f1", &file).await.unwrap();
    let user = store.get::<Users>("u1").await.unwrap().unwrap();
    assert_eq!(user.files, vec!["f1".to_string()]);
}

#[tokio::test]
async fn test_failed_file_write_rolls_back_ownership() {
    let (_dir, store, data_dir) = test_store().await;
    store
        .put::<Users>("u1", &UserRecord::new("u1", "alice", false))
        .await
        .unwrap();
    let files_before = std::fs::read(data_dir.join("files.json")).unwrap();
    let users_before = std::fs::read(data_dir.join("users.json")).unwrap();

    std::fs::create_dir(data_dir.join("files.json.tmp")).unwrap();

    let mut file = sample_file("f1", "a.png", 10);
    file.uploader = "u1".to_string();
    let err = store.put::<Files>("f1", &file).await.unwrap_err();
    assert!(err.is_storage_io());

    // The ownership entry written first has been undone
    assert_eq!(std::fs::read(data_dir.join("users.json")).unwrap(), users_before);
    assert_eq!(std::fs::read(data_dir.join("files.json")).unwrap(), files_before);
    let user = store.get::<Users>("u1").await.unwrap().unwrap();
    assert!(user.files.is_empty());
    assert!(store.get::<Files>("f1").await.unwrap().is_none());

    std::fs::remove_dir(data_dir.join("files.json.tmp")).unwrap();
    store.put::<Files>("f1", &file).await.unwrap();
    assert!(store.get::<Files>("f1").await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_visible_file_record_always_has_its_owner_entry() {
    let (_dir, store, _) = test_store().await;
    store
        .put::<Users>("u1", &UserRecord::new("u1", "alice", false))
        .await
        .unwrap();

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for i in 0..20 {
                let key = format!("f{i}");
                let mut file = sample_file(&key, "a.png", 1);
                file.uploader = "u1".to_string();
                store.put::<Files>(&key, &file).await.unwrap();
            }
        })
    };

    while !writer.is_finished() {
        let files = store.get_all::<Files>().await.unwrap();
        let owned = store.get::<Users>("u1").await.unwrap().unwrap().files;
        for key in files.keys() {
            assert!(owned.contains(key), "{key} visible before its owner entry");
        }
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_corrupt_document_is_an_error() {
    let (_dir, store, data_dir) = test_store().await;
    std::fs::write(data_dir.join("files.json"), b"{ not json").unwrap();

    let err = store.get::<Files>("abc").await.unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }));
    assert!(err.is_storage_io());

    let err = store
        .put::<Files>("abc", &sample_file("abc", "a.png", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }));

    // Nothing was fabricated over the corrupt content
    assert_eq!(
        std::fs::read(data_dir.join("files.json")).unwrap(),
        b"{ not json"
    );
}

#[tokio::test]
async fn test_missing_document_after_bootstrap_is_an_error() {
    let (_dir, store, data_dir) = test_store().await;
    std::fs::remove_file(data_dir.join("users.json")).unwrap();

    let err = store.get_all::<Users>().await.unwrap_err();
    assert!(matches!(err, StoreError::StorageIo { .. }));
}

#[tokio::test]
async fn test_no_temp_files_left_behind() {
    let (_dir, store, data_dir) = test_store().await;
    store
        .put::<Files>("abc", &sample_file("abc", "a.png", 1))
        .await
        .unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(&data_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_puts_lose_nothing() {
    let (_dir, store, _) = test_store().await;

    let mut handles = Vec::new();
    for i in 0..32 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let id = format!("file-{i}");
            store
                .put::<Files>(&id, &sample_file(&id, "c.png", i))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.get_all::<Files>().await.unwrap().len(), 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_key_has_one_winner() {
    let (_dir, store, _) = test_store().await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .put::<Files>("contested", &sample_file("contested", "x.png", i))
                .await
        }));
    }

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => ok += 1,
            Err(StoreError::KeyConflict { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(ok, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_owned_uploads_and_registrations() {
    let (_dir, store, _) = test_store().await;
    store
        .put::<Users>("owner", &UserRecord::new("owner", "owner", false))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let id = format!("f{i}");
            let mut file = sample_file(&id, "o.png", i);
            file.uploader = "owner".to_string();
            store.put::<Files>(&id, &file).await?;

            let user_id = format!("u{i}");
            store
                .put::<Users>(&user_id, &UserRecord::new(&user_id, "someone", false))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let owner = store.get::<Users>("owner").await.unwrap().unwrap();
    assert_eq!(owner.files.len(), 16);
    assert_eq!(store.get_all::<Files>().await.unwrap().len(), 16);
    assert_eq!(store.get_all::<Users>().await.unwrap().len(), 17);
}

// ============================================================================
// Backend used directly
// ============================================================================

#[tokio::test]
async fn test_backend_contract_without_facade() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(JsonBackend::new(dir.path()));

    // close before open is harmless
    backend.close().await.unwrap();
    backend.open().await.unwrap();
    backend.open().await.unwrap();
    backend.configure().await.unwrap();
    backend.configure().await.unwrap();

    assert_eq!(
        backend.document_path(DocumentId::Files),
        dir.path().join("files.json")
    );

    backend
        .put(TableId::Users, "k", json!({ "id": "k", "username": "kay" }))
        .await
        .unwrap();
    assert_eq!(
        backend.get(TableId::Users, "k").await.unwrap(),
        Some(json!({ "id": "k", "username": "kay" }))
    );
    assert!(backend.get(TableId::Files, "k").await.unwrap().is_none());

    let store = Store::new(backend);
    let user = store.get::<Users>("k").await.unwrap().unwrap();
    assert_eq!(user.username, "kay");
    assert!(user.files.is_empty());
}
