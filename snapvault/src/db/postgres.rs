//! PostgreSQL metadata store implementation.
//!
//! Uses a dedicated connection pool sized from [`PoolSettings`] and runs the
//! embedded migrations on connect. Queries use the runtime sqlx API with
//! [`sqlx::FromRow`] row mapping; constraint violations are classified by
//! [`DbError::from`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::instrument;
use uuid::Uuid;

use super::MetadataStore;
use super::errors::{DbError, Result};
use super::models::{ImageCreate, ImageRecord, UserCreate, UserRecord};
use crate::config::PoolSettings;
use crate::types::{ImageId, UserId, abbrev_uuid};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL, run migrations, and return the store.
    pub async fn connect(url: &str, settings: &PoolSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(settings.idle_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| DbError::Other(anyhow::anyhow!("Failed to connect to database: {e}")))?;

        crate::migrator()
            .run(&pool)
            .await
            .map_err(|e| DbError::Other(anyhow::anyhow!("Failed to run migrations: {e}")))?;

        tracing::info!(
            "PostgreSQL metadata store initialized (pool: {} connections)",
            pool.options().get_max_connections()
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool (migrations are assumed to have run).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    #[instrument(skip(self, request), fields(email = %request.email), err)]
    async fn create_user(&self, request: &UserCreate) -> Result<UserRecord> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (id, email, auth_provider_id, email_confirmed)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.email)
        .bind(&request.auth_provider_id)
        .bind(request.email_confirmed)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self, request), fields(email = %request.email), err)]
    async fn find_or_create_user(&self, request: &UserCreate) -> Result<UserRecord> {
        // ON CONFLICT DO UPDATE so the existing row is RETURNED unchanged;
        // DO NOTHING would return no row at all.
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (id, email, auth_provider_id, email_confirmed)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (auth_provider_id) DO UPDATE SET updated_at = now()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.email)
        .bind(&request.auth_provider_id)
        .bind(request.email_confirmed)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn user_by_id(&self, id: UserId) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, email), err)]
    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, auth_provider_id), err)]
    async fn user_by_auth_id(&self, auth_provider_id: &str) -> Result<Option<UserRecord>> {
        let user =
            sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE auth_provider_id = $1")
                .bind(auth_provider_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(user)
    }

    #[instrument(skip(self, code), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn set_confirmation_code(
        &self,
        id: UserId,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<UserRecord> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            UPDATE users SET
                confirmation_code = $2,
                confirmation_expires_at = $3,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn confirm_email(&self, id: UserId) -> Result<UserRecord> {
        let user = sqlx::query_as::<_, UserRecord>(
            r#"
            UPDATE users SET
                email_confirmed = TRUE,
                confirmation_code = NULL,
                confirmation_expires_at = NULL,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(user)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), filename = %request.filename), err)]
    async fn create_image(&self, request: &ImageCreate) -> Result<ImageRecord> {
        let image = sqlx::query_as::<_, ImageRecord>(
            r#"
            INSERT INTO images (id, user_id, filename, original_name, url, size)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.filename)
        .bind(&request.original_name)
        .bind(&request.url)
        .bind(request.size)
        .fetch_one(&self.pool)
        .await?;

        Ok(image)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    async fn images_for_user(&self, user_id: UserId) -> Result<Vec<ImageRecord>> {
        let images = sqlx::query_as::<_, ImageRecord>(
            "SELECT * FROM images WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(images)
    }

    #[instrument(skip(self), fields(image_id = %abbrev_uuid(&id), user_id = %abbrev_uuid(&user_id)), err)]
    async fn image_for_user(&self, id: ImageId, user_id: UserId) -> Result<Option<ImageRecord>> {
        let image = sqlx::query_as::<_, ImageRecord>(
            "SELECT * FROM images WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(image)
    }

    #[instrument(skip(self), fields(image_id = %abbrev_uuid(&id), user_id = %abbrev_uuid(&user_id)), err)]
    async fn delete_image(&self, id: ImageId, user_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM images WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
