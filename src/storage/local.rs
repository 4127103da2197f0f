use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use super::{Storage, StorageError};

// Local filesystem blob storage
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf, // Base directory where blobs are stored
}

impl LocalStorage {
    /// Create a LocalStorage rooted at `base_path`, ensuring the blob
    /// directory exists.
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base_path = base_path.into();
        fs::create_dir_all(base_path.join("blobs")).await?;
        Ok(Self { base_path })
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    /// Writes content under a temporary name and renames it into place, so a
    /// reader of a content-addressed key never observes a partial blob.
    async fn put(&self, key: &str, content: Bytes) -> Result<(), StorageError> {
        let full_path = self.full_path(key);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp_path = self
            .base_path
            .join(format!("{}.{}.tmp", key, Uuid::new_v4().simple()));
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(&content).await?;
        file.flush().await?;
        drop(file);
        fs::rename(&tmp_path, &full_path).await?;

        tracing::debug!("Stored blob at {:?}", full_path);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let full_path = self.full_path(key);

        if !Path::new(&full_path).exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let content = fs::read(&full_path).await?;
        Ok(Bytes::from(content))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let full_path = self.full_path(key);

        if Path::new(&full_path).exists() {
            fs::remove_file(&full_path).await?;
        }
        Ok(())
    }
}
