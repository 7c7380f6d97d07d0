//! Object storage client.
//!
//! Uploaded files live in an external blob store addressed by key; this module
//! abstracts it behind the [`ObjectStorage`] trait. The Backblaze B2
//! implementation talks to the B2 native API, the local implementation keeps
//! objects on disk for development, and the in-memory implementation backs
//! tests.
//!
//! Durability and replication belong to the backend. There is no retry policy:
//! a single failed call surfaces immediately.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::StorageConfig;

pub mod b2;
pub mod local;
pub mod memory;

/// Result type for object storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur while talking to the storage backend
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No object under the given key
    #[error("object not found: {0}")]
    NotFound(String),

    /// Backend-reported failure
    #[error("storage provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    /// The backend could not be reached at all
    #[error("storage request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// An object to upload
#[derive(Debug, Clone)]
pub struct PutObject {
    /// Unique storage key (derived from owner id + upload timestamp)
    pub key: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Acknowledgement of a completed upload
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Publicly constructed location of the object
    pub url: String,
}

/// Abstract object storage interface
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload an object. Returns only once the backend has acknowledged the
    /// write; metadata rows must not be created before that.
    async fn put(&self, object: PutObject) -> Result<StoredObject>;

    /// Delete the object under the key. Deleting a missing object is an error
    /// callers may choose to swallow.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check whether an object exists under the key.
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Create a storage backend based on configuration
pub async fn create_storage(config: &StorageConfig) -> anyhow::Result<Arc<dyn ObjectStorage>> {
    match config {
        StorageConfig::B2(b2_config) => {
            tracing::info!("Creating Backblaze B2 storage backend");
            let storage = b2::B2Storage::connect(b2_config.clone()).await?;
            Ok(Arc::new(storage))
        }
        StorageConfig::Local { path } => {
            tracing::info!("Creating local storage backend (path: {:?})", path);
            // Ensure directory exists
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create storage directory {path:?}: {e}"))?;
            Ok(Arc::new(local::LocalStorage::new(path.clone())))
        }
        StorageConfig::Memory => {
            tracing::info!("Creating in-memory storage backend (objects are lost on shutdown)");
            Ok(Arc::new(memory::MemoryStorage::new()))
        }
    }
}
