//! Image handlers: multipart upload, list, get, and delete.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::{
    AppState,
    api::models::{
        MessageResponse,
        images::{ImageGetResponse, ImageListResponse, ImageUploadResponse},
        users::CurrentUser,
    },
    db::models::ImageCreate,
    errors::{Error, Result},
    storage::PutObject,
    types::{ImageId, UserId},
};

struct UploadedFile {
    original_name: String,
    content_type: String,
    data: Bytes,
}

/// Derive the unique storage key for an upload: owner id + timestamp + the
/// extension of the client-supplied name.
fn storage_key(user_id: UserId, original_name: &str, now: DateTime<Utc>) -> String {
    let extension = original_name.rsplit('.').next().unwrap_or("bin");
    format!("user_{}_{}.{}", user_id, now.timestamp_millis(), extension)
}

/// Pull the single `image` field out of the multipart body.
async fn read_image_field(multipart: &mut Multipart) -> Result<Option<UploadedFile>> {
    while let Some(field) = multipart.next_field().await.map_err(|e| Error::BadRequest {
        message: format!("Failed to parse multipart data: {e}"),
    })? {
        if field.name() != Some("image") {
            continue;
        }

        let original_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.map_err(|e| Error::BadRequest {
            message: format!("Failed to read file data: {e}"),
        })?;

        return Ok(Some(UploadedFile {
            original_name,
            content_type,
            data,
        }));
    }
    Ok(None)
}

/// Upload an image
#[utoipa::path(
    post,
    path = "/api/images",
    tag = "images",
    request_body(
        content_type = "multipart/form-data",
        description = "File upload with a single `image` field"
    ),
    responses(
        (status = 201, description = "Image uploaded successfully", body = ImageUploadResponse),
        (status = 400, description = "No file uploaded"),
        (status = 401, description = "Missing token"),
        (status = 403, description = "Invalid or expired token"),
        (status = 500, description = "Storage or metadata failure"),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id))]
pub async fn upload_image(
    State(state): State<AppState>,
    current_user: CurrentUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ImageUploadResponse>)> {
    let upload = read_image_field(&mut multipart)
        .await?
        .ok_or_else(|| Error::BadRequest {
            message: "No file uploaded".to_string(),
        })?;

    let key = storage_key(current_user.id, &upload.original_name, Utc::now());
    let size = upload.data.len() as i64;

    // Object-store write first; the metadata row is only created once the
    // upload is acknowledged.
    let stored = state
        .storage
        .put(PutObject {
            key: key.clone(),
            content_type: upload.content_type,
            data: upload.data,
        })
        .await?;

    let image = match state
        .db
        .create_image(&ImageCreate {
            user_id: current_user.id,
            filename: key.clone(),
            original_name: upload.original_name,
            url: stored.url,
            size,
        })
        .await
    {
        Ok(image) => image,
        Err(e) => {
            // The stored object is orphaned from here; the upload side effect
            // is already committed and is not rolled back.
            tracing::error!(key = %key, error = %e, "Failed to store image metadata after upload");
            return Err(Error::Internal {
                operation: "store image metadata".to_string(),
            });
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(ImageUploadResponse {
            message: "Image uploaded successfully".to_string(),
            image: image.into(),
        }),
    ))
}

/// List the caller's images, newest first
#[utoipa::path(
    get,
    path = "/api/images",
    tag = "images",
    responses(
        (status = 200, description = "Images owned by the caller", body = ImageListResponse),
        (status = 401, description = "Missing token"),
        (status = 403, description = "Invalid or expired token"),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id))]
pub async fn list_images(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<ImageListResponse>> {
    let images = state.db.images_for_user(current_user.id).await?;
    Ok(Json(ImageListResponse {
        images: images.into_iter().map(Into::into).collect(),
    }))
}

/// Fetch a single image by id
#[utoipa::path(
    get,
    path = "/api/images/{id}",
    tag = "images",
    params(("id" = String, Path, description = "Image id")),
    responses(
        (status = 200, description = "Image record", body = ImageGetResponse),
        (status = 404, description = "No image with this id owned by the caller"),
        (status = 401, description = "Missing token"),
        (status = 403, description = "Invalid or expired token"),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id))]
pub async fn get_image(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<ImageId>,
) -> Result<Json<ImageGetResponse>> {
    let image = state
        .db
        .image_for_user(id, current_user.id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Image".to_string(),
        })?;

    Ok(Json(ImageGetResponse {
        image: image.into(),
    }))
}

/// Delete an image
#[utoipa::path(
    delete,
    path = "/api/images/{id}",
    tag = "images",
    params(("id" = String, Path, description = "Image id")),
    responses(
        (status = 200, description = "Image deleted", body = MessageResponse),
        (status = 404, description = "No image with this id owned by the caller"),
        (status = 401, description = "Missing token"),
        (status = 403, description = "Invalid or expired token"),
        (status = 500, description = "Metadata deletion failed"),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all, fields(user_id = %current_user.id))]
pub async fn delete_image(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(id): Path<ImageId>,
) -> Result<Json<MessageResponse>> {
    let image = state
        .db
        .image_for_user(id, current_user.id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Image".to_string(),
        })?;

    // Best-effort compensating delete: the outcome is logged and metadata
    // cleanup proceeds regardless. An orphaned storage object is preferred
    // over a record the user cannot remove.
    match state.storage.delete(&image.filename).await {
        Ok(()) => tracing::debug!(key = %image.filename, "Storage object deleted"),
        Err(e) => {
            tracing::warn!(key = %image.filename, error = %e, "Failed to delete storage object; continuing with metadata delete");
        }
    }

    let deleted = state.db.delete_image(id, current_user.id).await?;
    if !deleted {
        return Err(Error::Internal {
            operation: "delete image record".to_string(),
        });
    }

    Ok(Json(MessageResponse::new("Image deleted successfully")))
}
