// Submodules for local file system storage and S3 storage
mod local;
mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::info;

use crate::config::Config;

pub use local::LocalStorage;
pub use s3::S3Storage;

// Storage error types
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Io Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Write Error: {0}")]
    WriteError(String),

    #[error("Delete Error: {0}")]
    DeleteError(String),
}

/// Blob storage backend. Keys are content-addressed (`blobs/<hash>`), so the
/// same content always writes to the same key and `put` is idempotent.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store content under the given key, replacing any existing object.
    /// Only ever called for the first (owning) upload of a content hash.
    async fn put(&self, key: &str, content: Bytes) -> Result<(), StorageError>;

    /// Fetch the content stored under the given key.
    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;

    /// Remove the object stored under the given key. The catalog only calls
    /// this once no record references the blob; a missing object is not an
    /// error so retries stay safe.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

// Enum to represent storage backends
#[derive(Clone)]
pub enum StorageBackend {
    Local(LocalStorage), // Local filesystem storage
    S3(S3Storage),       // AWS S3 or MinIO storage
}

// Implement Storage trait for StorageBackend enum
// Delegates calls to the chosen backend
#[async_trait]
impl Storage for StorageBackend {
    async fn put(&self, key: &str, content: Bytes) -> Result<(), StorageError> {
        match self {
            StorageBackend::Local(s) => s.put(key, content).await,
            StorageBackend::S3(s) => s.put(key, content).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        match self {
            StorageBackend::Local(s) => s.get(key).await,
            StorageBackend::S3(s) => s.get(key).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match self {
            StorageBackend::Local(s) => s.delete(key).await,
            StorageBackend::S3(s) => s.delete(key).await,
        }
    }
}

// Initialize the storage backend based on config
pub async fn init_storage(config: &Config) -> Result<StorageBackend, StorageError> {
    if config.use_s3 {
        info!("Initializing S3 storage");
        Ok(StorageBackend::S3(S3Storage::new(config).await))
    } else {
        info!("Initializing Local storage");
        Ok(StorageBackend::Local(
            LocalStorage::new(&config.local_storage_path).await?,
        ))
    }
}
