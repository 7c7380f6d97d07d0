pub mod auth;
pub mod images;

use axum::Json;
use axum::response::Html;

use crate::api::models::HealthResponse;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        message: "Server is running".to_string(),
    })
}

/// Landing page linked from the identity provider's confirmation emails
pub async fn confirmation_success() -> Html<&'static str> {
    Html("Your email has been confirmed. You can now log in.")
}
