//! Metadata store client.
//!
//! The relational store holding application users and image records is an
//! external collaborator; this module abstracts it behind the [`MetadataStore`]
//! trait with a PostgreSQL implementation for production and an in-memory
//! implementation for development and tests.
//!
//! Every image read/update/delete is scoped by the owning user id so handlers
//! cannot reach across users, and user rows carry the 1:1 link to the identity
//! provider (`auth_provider_id`).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::DatabaseConfig;
use crate::types::{ImageId, UserId};

pub mod errors;
pub mod memory;
pub mod models;
pub mod postgres;

use errors::Result;
use models::{ImageCreate, ImageRecord, UserCreate, UserRecord};

/// Persistence operations for application users and image metadata.
///
/// Implementations are process-wide singletons, constructed once at startup
/// and shared read-only across concurrently executing requests.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a new user. Fails with a unique violation if the email or
    /// identity-provider id is already taken.
    async fn create_user(&self, request: &UserCreate) -> Result<UserRecord>;

    /// Idempotent upsert keyed by `auth_provider_id`: returns the existing row
    /// unchanged when present, inserts it otherwise.
    async fn find_or_create_user(&self, request: &UserCreate) -> Result<UserRecord>;

    async fn user_by_id(&self, id: UserId) -> Result<Option<UserRecord>>;

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    async fn user_by_auth_id(&self, auth_provider_id: &str) -> Result<Option<UserRecord>>;

    /// Store a confirmation code and its expiry on the user row (both fields
    /// set together).
    async fn set_confirmation_code(
        &self,
        id: UserId,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<UserRecord>;

    /// Mark the email as confirmed and clear any pending confirmation code and
    /// expiry (both fields cleared together).
    async fn confirm_email(&self, id: UserId) -> Result<UserRecord>;

    /// Insert an image record. Only called after the storage upload has been
    /// acknowledged as complete.
    async fn create_image(&self, request: &ImageCreate) -> Result<ImageRecord>;

    /// All images owned by the user, newest first.
    async fn images_for_user(&self, user_id: UserId) -> Result<Vec<ImageRecord>>;

    /// A single image matching both id and owner; `None` covers "does not
    /// exist" and "exists but not yours" identically.
    async fn image_for_user(&self, id: ImageId, user_id: UserId) -> Result<Option<ImageRecord>>;

    /// Delete the image row scoped by id and owner. Returns whether a row was
    /// removed.
    async fn delete_image(&self, id: ImageId, user_id: UserId) -> Result<bool>;

    /// Connectivity check backing the `/auth/test-db` endpoint.
    async fn ping(&self) -> Result<()>;
}

/// Create a metadata store backend based on configuration
pub async fn create_store(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn MetadataStore>> {
    match config {
        DatabaseConfig::Postgres { url, pool } => {
            tracing::info!("Creating PostgreSQL metadata store");
            let store = postgres::PostgresStore::connect(url, pool).await?;
            Ok(Arc::new(store))
        }
        DatabaseConfig::Memory => {
            tracing::info!("Creating in-memory metadata store (data is lost on shutdown)");
            Ok(Arc::new(memory::MemoryStore::new()))
        }
    }
}
