//! # snapvault: image upload backend
//!
//! `snapvault` is a small backend that wraps a hosted authentication service
//! for signup/login/email-confirmation flows and an object-storage service for
//! uploading, listing, fetching, and deleting user images, persisting metadata
//! in a relational store.
//!
//! ## Overview
//!
//! All heavy lifting is delegated: password hashing and token issuance belong
//! to the identity provider, file durability to the object store, and record
//! persistence to PostgreSQL. What this crate owns is the contract between
//! them - the authentication/authorization rules on every route and the
//! metadata-consistency handshake around uploads and deletes.
//!
//! ### Request Flow
//!
//! Requests to `/api/images/*` pass through the bearer-token extractor
//! ([`api::models::users::CurrentUser`]): the token is verified with the
//! identity provider, resolved to an application user row (auto-created on
//! first sight by default), and injected into the handler. Account lifecycle
//! routes under `/auth/*` talk to the identity provider directly and keep the
//! application user table in sync with it - including lazily repairing rows
//! that have gone missing.
//!
//! Uploads write the object to storage first and only then insert the
//! metadata row; deletes remove the metadata row even when the storage-side
//! delete fails. The resulting partial-failure states (an orphaned object, a
//! provider account without a row) are accepted and logged rather than rolled
//! back - there is deliberately no transactional coupling between the two
//! external systems.
//!
//! ### Core Components
//!
//! The **API layer** ([`api`]) holds the axum handlers and their
//! request/response models. The **authentication layer** ([`auth`]) implements
//! the bearer-token extractor and the out-of-band confirmation code flow. The
//! external collaborators each sit behind a trait with swappable backends:
//! [`identity::IdentityProvider`] (GoTrue-style HTTP or in-memory dummy),
//! [`storage::ObjectStorage`] (Backblaze B2, local filesystem, or in-memory),
//! and [`db::MetadataStore`] (PostgreSQL or in-memory).
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use snapvault::{Application, Config, telemetry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = snapvault::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod identity;
mod openapi;
pub mod storage;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::{
    Router,
    routing::{get, post},
};
use bon::Builder;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;
use config::CorsOrigin;
use db::MetadataStore;
use identity::IdentityProvider;
use openapi::ApiDoc;
use storage::ObjectStorage;
pub use types::{ImageId, UserId};

/// Application state shared across all request handlers.
///
/// Holds the three external-service clients and the configuration. All fields
/// are constructed once at startup and are read-only afterwards, so the state
/// is safely usable from concurrently executing requests.
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: Arc<dyn MetadataStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub storage: Arc<dyn ObjectStorage>,
    pub config: Config,
}

/// Get the snapvault database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(config.cors.allow_credentials);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// - Account lifecycle routes under `/auth/*` (no auth middleware; token-based
///   routes extract the bearer token themselves)
/// - Image routes under `/api/images`, all behind the bearer-token extractor
/// - `/health` and interactive API docs at `/docs`
/// - CORS and tracing layers
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let auth_routes = Router::new()
        .route("/auth/signup", post(api::handlers::auth::signup))
        .route("/auth/login", post(api::handlers::auth::login))
        .route(
            "/auth/resend-verification",
            post(api::handlers::auth::resend_verification),
        )
        .route("/auth/verify", get(api::handlers::auth::verify_token))
        .route("/auth/repair-user", post(api::handlers::auth::repair_user))
        .route("/auth/manual-confirm", post(api::handlers::auth::manual_confirm))
        .route(
            "/auth/verify-manual-confirmation",
            post(api::handlers::auth::verify_manual_confirmation),
        )
        .route("/auth/test-db", get(api::handlers::auth::test_db))
        .with_state(state.clone());

    let image_routes = Router::new()
        .route(
            "/",
            post(api::handlers::images::upload_image).get(api::handlers::images::list_images),
        )
        .route(
            "/{id}",
            get(api::handlers::images::get_image).delete(api::handlers::images::delete_image),
        )
        .layer(DefaultBodyLimit::max(state.config.max_upload_size))
        .with_state(state.clone());

    let router = Router::new()
        .route("/health", get(api::handlers::health))
        .route("/success", get(api::handlers::confirmation_success))
        .merge(auth_routes)
        .nest("/api/images", image_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let cors_layer = create_cors_layer(&state.config)?;

    let router = router.layer(cors_layer).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] constructs the external-service clients
///    (authorizing with the storage backend, running database migrations) and
///    builds the router.
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles
///    requests until the shutdown future resolves.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all clients initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        tracing::debug!("Starting snapvault with configuration: {:#?}", config);

        let db = db::create_store(&config.database).await?;
        let identity = identity::create_provider(&config.identity);
        let storage = storage::create_storage(&config.storage).await?;

        let state = AppState::builder()
            .db(db)
            .identity(identity)
            .storage(storage)
            .config(config.clone())
            .build();

        let router = build_router(&state)?;

        Ok(Self { router, config })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "snapvault listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutdown complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::create_test_server;

    #[tokio::test]
    async fn test_health_endpoint() {
        let (server, _backends) = create_test_server(|_| {}).await;

        let response = server.get("/health").await;
        response.assert_status_ok();

        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "OK");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (server, _backends) = create_test_server(|_| {}).await;
        server
            .get("/nope")
            .await
            .assert_status(axum::http::StatusCode::NOT_FOUND);
    }
}
