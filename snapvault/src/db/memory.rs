//! In-memory metadata store implementation.
//!
//! Stores all rows in memory behind a `parking_lot::RwLock`. Suitable for
//! development and tests; data is lost on restart. Enforces the same unique
//! constraints as the PostgreSQL schema so handler behavior matches across
//! backends.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::MetadataStore;
use super::errors::{DbError, Result};
use super::models::{ImageCreate, ImageRecord, UserCreate, UserRecord};
use crate::types::{ImageId, UserId};

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, UserRecord>,
    images: HashMap<ImageId, ImageRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn unique_violation(constraint: &str) -> DbError {
        DbError::UniqueViolation {
            constraint: Some(constraint.to_string()),
            table: Some("users".to_string()),
            message: format!("duplicate key value violates unique constraint \"{constraint}\""),
        }
    }

    fn insert_user(tables: &mut Tables, request: &UserCreate) -> Result<UserRecord> {
        if tables.users.values().any(|u| u.email == request.email) {
            return Err(Self::unique_violation("users_email_key"));
        }
        if tables
            .users
            .values()
            .any(|u| u.auth_provider_id == request.auth_provider_id)
        {
            return Err(Self::unique_violation("users_auth_provider_id_key"));
        }

        let now = Utc::now();
        let user = UserRecord {
            id: Uuid::new_v4(),
            email: request.email.clone(),
            auth_provider_id: request.auth_provider_id.clone(),
            email_confirmed: request.email_confirmed,
            confirmation_code: None,
            confirmation_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn update_user<F>(&self, id: UserId, apply: F) -> Result<UserRecord>
    where
        F: FnOnce(&mut UserRecord),
    {
        let mut tables = self.tables.write();
        let user = tables.users.get_mut(&id).ok_or(DbError::NotFound)?;
        apply(user);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn create_user(&self, request: &UserCreate) -> Result<UserRecord> {
        let mut tables = self.tables.write();
        Self::insert_user(&mut tables, request)
    }

    async fn find_or_create_user(&self, request: &UserCreate) -> Result<UserRecord> {
        let mut tables = self.tables.write();
        if let Some(existing) = tables
            .users
            .values()
            .find(|u| u.auth_provider_id == request.auth_provider_id)
        {
            return Ok(existing.clone());
        }
        Self::insert_user(&mut tables, request)
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<UserRecord>> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .tables
            .read()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn user_by_auth_id(&self, auth_provider_id: &str) -> Result<Option<UserRecord>> {
        Ok(self
            .tables
            .read()
            .users
            .values()
            .find(|u| u.auth_provider_id == auth_provider_id)
            .cloned())
    }

    async fn set_confirmation_code(
        &self,
        id: UserId,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<UserRecord> {
        self.update_user(id, |user| {
            user.confirmation_code = Some(code.to_string());
            user.confirmation_expires_at = Some(expires_at);
        })
    }

    async fn confirm_email(&self, id: UserId) -> Result<UserRecord> {
        self.update_user(id, |user| {
            user.email_confirmed = true;
            user.confirmation_code = None;
            user.confirmation_expires_at = None;
        })
    }

    async fn create_image(&self, request: &ImageCreate) -> Result<ImageRecord> {
        let mut tables = self.tables.write();
        if !tables.users.contains_key(&request.user_id) {
            return Err(DbError::ForeignKeyViolation {
                constraint: Some("images_user_id_fkey".to_string()),
                table: Some("images".to_string()),
                message: "referenced user does not exist".to_string(),
            });
        }

        let image = ImageRecord {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            filename: request.filename.clone(),
            original_name: request.original_name.clone(),
            url: request.url.clone(),
            size: request.size,
            created_at: Utc::now(),
        };
        tables.images.insert(image.id, image.clone());
        Ok(image)
    }

    async fn images_for_user(&self, user_id: UserId) -> Result<Vec<ImageRecord>> {
        let mut images: Vec<ImageRecord> = self
            .tables
            .read()
            .images
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        images.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(images)
    }

    async fn image_for_user(&self, id: ImageId, user_id: UserId) -> Result<Option<ImageRecord>> {
        Ok(self
            .tables
            .read()
            .images
            .get(&id)
            .filter(|i| i.user_id == user_id)
            .cloned())
    }

    async fn delete_image(&self, id: ImageId, user_id: UserId) -> Result<bool> {
        let mut tables = self.tables.write();
        let owned = tables
            .images
            .get(&id)
            .is_some_and(|i| i.user_id == user_id);
        if owned {
            tables.images.remove(&id);
        }
        Ok(owned)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
