//! API request/response models for application users.

use crate::db::models::UserRecord;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Public view of an application user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub auth_provider_id: String,
    pub email_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for UserResponse {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            auth_provider_id: record.auth_provider_id,
            email_confirmed: record.email_confirmed,
            created_at: record.created_at,
        }
    }
}

/// The authenticated user attached to a request by the auth extractor
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub email: String,
    pub auth_provider_id: String,
    pub email_confirmed: bool,
}

impl From<UserRecord> for CurrentUser {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            auth_provider_id: record.auth_provider_id,
            email_confirmed: record.email_confirmed,
        }
    }
}
