//! Identity provider client.
//!
//! Signup, password login, token issuance, and token verification are
//! delegated to an external identity service; this module abstracts it behind
//! the [`IdentityProvider`] trait. The GoTrue-style HTTP implementation talks
//! to a hosted auth API (e.g. Supabase Auth), and the dummy implementation
//! keeps accounts in memory for development and tests.
//!
//! Token internals (format, signing, expiry) belong to the provider and are
//! never inspected here; sessions are passed through to clients verbatim.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::IdentityProviderConfig;

pub mod dummy;
pub mod gotrue;

/// Result type for identity provider operations
pub type Result<T> = std::result::Result<T, IdentityError>;

/// Errors that can occur while talking to the identity provider
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The provider rejected the email/password pair
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The provider requires the email to be confirmed first
    #[error("email address has not been confirmed")]
    EmailNotConfirmed,

    /// The provider already has an account for this email
    #[error("an account with this email address already exists")]
    AlreadyRegistered,

    /// Any other provider-reported failure
    #[error("identity provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    /// The provider could not be reached at all
    #[error("identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Provider-level view of a user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderUser {
    /// Opaque provider-assigned id, mirrored into `users.auth_provider_id`
    pub id: String,
    pub email: String,
    pub email_confirmed: bool,
}

/// Provider-issued session, returned to clients verbatim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Outcome of a signup call; the session is absent when the provider requires
/// email confirmation before issuing tokens.
#[derive(Debug, Clone)]
pub struct SignUp {
    pub user: ProviderUser,
    pub session: Option<ProviderSession>,
}

/// Outcome of a successful password login
#[derive(Debug, Clone)]
pub struct SignIn {
    pub user: ProviderUser,
    pub session: ProviderSession,
}

/// Abstract identity provider interface
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a provider account for the email/password pair.
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp>;

    /// Verify credentials and obtain a session.
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignIn>;

    /// Validate an access token and resolve the provider user it belongs to.
    async fn get_user(&self, access_token: &str) -> Result<ProviderUser>;

    /// Ask the provider to re-send its confirmation email.
    async fn resend_verification(&self, email: &str) -> Result<()>;
}

/// Create an identity provider from configuration
///
/// This is the single point where we convert config into provider instances.
pub fn create_provider(config: &IdentityProviderConfig) -> Arc<dyn IdentityProvider> {
    match config {
        IdentityProviderConfig::Gotrue(gotrue_config) => {
            tracing::info!("Creating GoTrue identity provider ({})", gotrue_config.url);
            Arc::new(gotrue::GotrueProvider::from(gotrue_config.clone()))
        }
        IdentityProviderConfig::Dummy(dummy_config) => {
            tracing::info!("Creating dummy identity provider (accounts are in-memory only)");
            Arc::new(dummy::DummyProvider::from(dummy_config.clone()))
        }
    }
}
