use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Upper bound for `ID_SIZE`
pub const MAX_ID_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub storage: StorageConfig,
    pub uploads: UploadConfig,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    /// Directory holding the JSON metadata documents
    pub data_dir: String,
    /// Base URL used in upload responses. Falls back to the request's Host header.
    pub public_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Directory for the local storage backend
    pub uploads_dir: String,
    /// Length of generated public identifiers
    pub id_size: usize,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Local,
    S3,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Required when backend is s3
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            uploads_dir: "./uploads".to_string(),
            id_size: 8,
            max_upload_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            s3: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir =
            std::env::var("DATA_DIR").unwrap_or_else(|_| "./.fileshare-data".to_string());

        let public_url = std::env::var("PUBLIC_URL")
            .ok()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty());

        let uploads_dir = std::env::var("UPLOADS_DIR").unwrap_or_else(|_| "./uploads".to_string());

        let id_size = match std::env::var("ID_SIZE") {
            Ok(raw) => raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!("ID_SIZE must be a number, got '{raw}'"))
            })?,
            Err(_) => UploadConfig::default().id_size,
        };

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(UploadConfig::default().max_upload_size);

        let backend = match std::env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "s3" => StorageBackend::S3,
            _ => StorageBackend::Local,
        };

        let s3 = match backend {
            StorageBackend::S3 => Some(S3Config {
                endpoint: required("S3_ENDPOINT")?,
                bucket: required("S3_BUCKET")?,
                region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                access_key: required("S3_ACCESS_KEY")?,
                secret_key: required("S3_SECRET_KEY")?,
            }),
            StorageBackend::Local => None,
        };

        let config = Config {
            node: NodeConfig {
                bind_address,
                data_dir,
                public_url,
            },
            storage: StorageConfig { backend, s3 },
            uploads: UploadConfig {
                uploads_dir,
                id_size,
                max_upload_size,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.data_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "DATA_DIR cannot be empty".to_string(),
            ));
        }

        if self.uploads.uploads_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "UPLOADS_DIR cannot be empty".to_string(),
            ));
        }

        if self.uploads.id_size == 0 || self.uploads.id_size > MAX_ID_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "ID_SIZE must be between 1 and {MAX_ID_SIZE}"
            )));
        }

        if self.storage.backend == StorageBackend::S3 && self.storage.s3.is_none() {
            return Err(ConfigError::ValidationError(
                "S3 settings are required when STORAGE_BACKEND=s3".to_string(),
            ));
        }

        if self.uploads.id_size < 6 {
            tracing::warn!(
                "ID_SIZE {} is short. Identifier collisions will force upload retries.",
                self.uploads.id_size
            );
        }

        Ok(())
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            ConfigError::ValidationError(format!("{name} is required when STORAGE_BACKEND=s3"))
        })
}
