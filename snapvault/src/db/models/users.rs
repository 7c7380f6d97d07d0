//! Database models for application users.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Request for creating (or upserting) an application user
#[derive(Debug, Clone)]
pub struct UserCreate {
    pub email: String,
    /// Identity-provider user id this row mirrors (1:1)
    pub auth_provider_id: String,
    pub email_confirmed: bool,
}

/// A stored application user row
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub auth_provider_id: String,
    pub email_confirmed: bool,
    /// Out-of-band confirmation code; always set and cleared together with
    /// `confirmation_expires_at`
    pub confirmation_code: Option<String>,
    pub confirmation_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
