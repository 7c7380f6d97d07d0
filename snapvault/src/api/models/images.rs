//! API request/response models for images.

use crate::db::models::ImageRecord;
use crate::types::{ImageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Public view of an image record
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImageResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ImageId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    /// Storage object key
    pub filename: String,
    /// Client-supplied name, informational only
    pub original_name: String,
    pub url: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

impl From<ImageRecord> for ImageResponse {
    fn from(record: ImageRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            filename: record.filename,
            original_name: record.original_name,
            url: record.url,
            size: record.size,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImageUploadResponse {
    pub message: String,
    pub image: ImageResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImageListResponse {
    pub images: Vec<ImageResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImageGetResponse {
    pub image: ImageResponse,
}
