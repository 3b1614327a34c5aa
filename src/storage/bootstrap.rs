use std::path::Path;

use serde_json::{json, Value};
use tracing::{debug, info};

use super::json::{to_tabbed_json, write_atomic};
use super::store::StoreError;
use super::tables::DocumentId;
use crate::random;

/// Length of the shared secret written to a fresh users document
pub const CLI_KEY_LENGTH: usize = 32;

fn files_seed() -> Value {
    json!({
        "files": {},
        "useSql": false,
        "meta": {}
    })
}

fn users_seed(cli_key: String) -> Value {
    json!({
        "tokens": [],
        "users": {},
        "cliKey": cli_key,
        "useSql": false,
        "meta": {}
    })
}

/// Create the data directory and any missing document with its empty seed.
///
/// Documents that already exist are left alone, whatever they contain.
pub async fn ensure_documents(data_dir: &Path) -> Result<(), StoreError> {
    debug!(data_dir = %data_dir.display(), "Checking data files");

    tokio::fs::create_dir_all(data_dir)
        .await
        .map_err(|e| StoreError::io(data_dir, e))?;

    for document in DocumentId::ALL {
        let path = data_dir.join(document.file_name());
        if tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?
        {
            continue;
        }

        let seed = match document {
            DocumentId::Files => files_seed(),
            DocumentId::Users => {
                users_seed(random::nanoid(CLI_KEY_LENGTH))
            }
        };

        write_atomic(&path, &to_tabbed_json(&seed)?).await?;
        info!(path = %path.display(), "Created data file");
    }

    debug!("Data files exist");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_users_seed_shape() {
        let seed = users_seed("x".repeat(CLI_KEY_LENGTH));
        assert_eq!(seed["tokens"], json!([]));
        assert_eq!(seed["users"], json!({}));
        assert_eq!(seed["useSql"], json!(false));
        assert_eq!(seed["meta"], json!({}));
        assert_eq!(seed["cliKey"].as_str().unwrap().len(), CLI_KEY_LENGTH);
    }

    #[test]
    fn test_files_seed_shape() {
        assert_eq!(
            files_seed(),
            json!({ "files": {}, "useSql": false, "meta": {} })
        );
    }
}
