//! Local filesystem storage backend - stores objects in a directory.
//! Useful for development and testing.

use std::path::PathBuf;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

use super::{ObjectStorage, PutObject, Result, StorageError, StoredObject};

pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }
}

#[async_trait::async_trait]
impl ObjectStorage for LocalStorage {
    #[instrument(skip_all, fields(key = %object.key, size = object.data.len()))]
    async fn put(&self, object: PutObject) -> Result<StoredObject> {
        let full_path = self.base_path.join(&object.key);

        // Ensure parent directory exists
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&full_path).await?;
        file.write_all(&object.data).await?;
        file.sync_all().await?;

        Ok(StoredObject {
            url: format!("file://{}", full_path.display()),
        })
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, key: &str) -> Result<()> {
        let full_path = self.base_path.join(key);

        if !full_path.exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        fs::remove_file(&full_path).await?;

        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.base_path.join(key).exists())
    }
}
