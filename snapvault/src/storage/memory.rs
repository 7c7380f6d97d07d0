//! In-memory storage backend.
//!
//! Stores object bytes in a map behind a `parking_lot::RwLock`. Suitable for
//! tests and single-process experiments; objects are lost on restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::instrument;

use super::{ObjectStorage, PutObject, Result, StorageError, StoredObject};

#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, Bytes>>,
    /// Successful uploads so far, observable from tests.
    puts: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful uploads.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Number of objects currently stored.
    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }
}

#[async_trait::async_trait]
impl ObjectStorage for MemoryStorage {
    #[instrument(skip_all, fields(key = %object.key, size = object.data.len()))]
    async fn put(&self, object: PutObject) -> Result<StoredObject> {
        self.objects
            .write()
            .insert(object.key.clone(), object.data);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(StoredObject {
            url: format!("memory://{}", object.key),
        })
    }

    #[instrument(skip(self), err)]
    async fn delete(&self, key: &str) -> Result<()> {
        self.objects
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    #[instrument(skip(self), err)]
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.read().contains_key(key))
    }
}
