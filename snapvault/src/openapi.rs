//! OpenAPI documentation configuration.
//!
//! Aggregates all handler path annotations and response schemas into a single
//! document, served interactively at `/docs`.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Registers the bearer-token security scheme referenced by the handlers.
struct BearerTokenAddon;

impl Modify for BearerTokenAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_token",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "snapvault",
        description = "Image upload backend: hosted identity provider for auth, object storage for files, relational metadata store for records."
    ),
    modifiers(&BearerTokenAddon),
    paths(
        crate::api::handlers::health,
        crate::api::handlers::auth::signup,
        crate::api::handlers::auth::login,
        crate::api::handlers::auth::resend_verification,
        crate::api::handlers::auth::verify_token,
        crate::api::handlers::auth::repair_user,
        crate::api::handlers::auth::manual_confirm,
        crate::api::handlers::auth::verify_manual_confirmation,
        crate::api::handlers::auth::test_db,
        crate::api::handlers::images::upload_image,
        crate::api::handlers::images::list_images,
        crate::api::handlers::images::get_image,
        crate::api::handlers::images::delete_image,
    ),
    components(schemas(
        crate::api::models::MessageResponse,
        crate::api::models::HealthResponse,
        crate::api::models::auth::SignupRequest,
        crate::api::models::auth::LoginRequest,
        crate::api::models::auth::EmailRequest,
        crate::api::models::auth::VerifyCodeRequest,
        crate::api::models::auth::SessionResponse,
        crate::api::models::auth::SignupResponse,
        crate::api::models::auth::LoginResponse,
        crate::api::models::auth::VerifyResponse,
        crate::api::models::auth::RepairUserResponse,
        crate::api::models::auth::ManualConfirmResponse,
        crate::api::models::users::UserResponse,
        crate::api::models::users::CurrentUser,
        crate::api::models::images::ImageResponse,
        crate::api::models::images::ImageUploadResponse,
        crate::api::models::images::ImageListResponse,
        crate::api::models::images::ImageGetResponse,
    )),
    tags(
        (name = "authentication", description = "Account lifecycle and token verification"),
        (name = "images", description = "Image upload and metadata"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;
