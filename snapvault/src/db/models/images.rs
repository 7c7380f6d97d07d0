//! Database models for image metadata.

use crate::types::{ImageId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Request for inserting an image record after a completed storage upload
#[derive(Debug, Clone)]
pub struct ImageCreate {
    pub user_id: UserId,
    /// Storage object key; corresponds to exactly one object in the backend
    pub filename: String,
    /// Client-supplied name, informational only
    pub original_name: String,
    pub url: String,
    pub size: i64,
}

/// A stored image metadata row
#[derive(Debug, Clone, FromRow)]
pub struct ImageRecord {
    pub id: ImageId,
    pub user_id: UserId,
    pub filename: String,
    pub original_name: String,
    pub url: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}
