//! GoTrue-style HTTP identity provider.
//!
//! Talks to a hosted auth API of the shape exposed by Supabase Auth:
//! `POST /signup`, `POST /token?grant_type=password`, `GET /user`,
//! `POST /resend`. The configured `api_key` is sent both as the `apikey`
//! header and as the default bearer credential, matching what the hosted
//! service expects from server-side callers.
//!
//! There is no retry policy: a single failed call surfaces immediately.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use url::Url;

use super::{
    IdentityError, IdentityProvider, ProviderSession, ProviderUser, Result, SignIn, SignUp,
};
use crate::config::GotrueConfig;

pub struct GotrueProvider {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl From<GotrueConfig> for GotrueProvider {
    fn from(config: GotrueConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.url,
            api_key: config.api_key,
        }
    }
}

/// User object as returned by the provider
#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
    email: Option<String>,
    email_confirmed_at: Option<DateTime<Utc>>,
    confirmed_at: Option<DateTime<Utc>>,
}

impl From<UserPayload> for ProviderUser {
    fn from(payload: UserPayload) -> Self {
        let email_confirmed =
            payload.email_confirmed_at.is_some() || payload.confirmed_at.is_some();
        Self {
            id: payload.id,
            email: payload.email.unwrap_or_default(),
            email_confirmed,
        }
    }
}

/// Signup responses come in two shapes: a bare user object when email
/// confirmation is pending, or a full session envelope when autoconfirm is on.
#[derive(Debug, Deserialize)]
struct SignUpPayload {
    id: Option<String>,
    email: Option<String>,
    email_confirmed_at: Option<DateTime<Utc>>,
    confirmed_at: Option<DateTime<Utc>>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
    user: Option<UserPayload>,
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    access_token: String,
    refresh_token: String,
    expires_in: Option<i64>,
    token_type: Option<String>,
    user: UserPayload,
}

/// Error body shapes vary between endpoints and provider versions.
#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ErrorPayload {
    fn into_message(self) -> String {
        self.msg
            .or(self.message)
            .or(self.error_description)
            .or(self.error)
            .unwrap_or_else(|| "unknown provider error".to_string())
    }
}

/// Map a provider error message onto the error taxonomy.
///
/// The exact message "Invalid login credentials" means a bad email/password
/// pair; messages mentioning the email or confirmation state mean the account
/// exists but is unconfirmed.
fn classify(status: StatusCode, message: String) -> IdentityError {
    let lower = message.to_lowercase();
    if message == "Invalid login credentials" {
        IdentityError::InvalidCredentials
    } else if lower.contains("already registered") || lower.contains("already exists") {
        IdentityError::AlreadyRegistered
    } else if lower.contains("email") || lower.contains("confirm") {
        IdentityError::EmailNotConfirmed
    } else {
        IdentityError::Provider {
            status: status.as_u16(),
            message,
        }
    }
}

impl GotrueProvider {
    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| IdentityError::Provider {
                status: 0,
                message: "identity provider URL cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .push(path);
        Ok(url)
    }

    async fn error_from_response(response: reqwest::Response) -> IdentityError {
        let status = response.status();
        let payload: ErrorPayload = response.json().await.unwrap_or_default();
        classify(status, payload.into_message())
    }
}

#[async_trait::async_trait]
impl IdentityProvider for GotrueProvider {
    #[instrument(skip_all, fields(email = %email))]
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUp> {
        let response = self
            .http
            .post(self.endpoint("signup")?)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let payload: SignUpPayload = response.json().await?;
        if let Some(access_token) = payload.access_token {
            // Session envelope: tokens plus a nested user object.
            let user = payload.user.ok_or_else(|| IdentityError::Provider {
                status: 200,
                message: "signup session response missing user object".to_string(),
            })?;
            Ok(SignUp {
                user: user.into(),
                session: Some(ProviderSession {
                    access_token,
                    refresh_token: payload.refresh_token.unwrap_or_default(),
                    expires_in: payload.expires_in,
                    token_type: payload.token_type,
                }),
            })
        } else {
            // Bare user object: confirmation email pending, no session yet.
            let id = payload.id.ok_or_else(|| IdentityError::Provider {
                status: 200,
                message: "signup response missing user id".to_string(),
            })?;
            Ok(SignUp {
                user: ProviderUser {
                    id,
                    email: payload.email.unwrap_or_else(|| email.to_string()),
                    email_confirmed: payload.email_confirmed_at.is_some()
                        || payload.confirmed_at.is_some(),
                },
                session: None,
            })
        }
    }

    #[instrument(skip_all, fields(email = %email))]
    async fn sign_in(&self, email: &str, password: &str) -> Result<SignIn> {
        let mut endpoint = self.endpoint("token")?;
        endpoint.set_query(Some("grant_type=password"));

        let response = self
            .http
            .post(endpoint)
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let payload: SessionPayload = response.json().await?;
        Ok(SignIn {
            user: payload.user.into(),
            session: ProviderSession {
                access_token: payload.access_token,
                refresh_token: payload.refresh_token,
                expires_in: payload.expires_in,
                token_type: payload.token_type,
            },
        })
    }

    #[instrument(skip_all)]
    async fn get_user(&self, access_token: &str) -> Result<ProviderUser> {
        let response = self
            .http
            .get(self.endpoint("user")?)
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let payload: UserPayload = response.json().await?;
        Ok(payload.into())
    }

    #[instrument(skip_all, fields(email = %email))]
    async fn resend_verification(&self, email: &str) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint("resend")?)
            .header("apikey", &self.api_key)
            .json(&json!({ "type": "signup", "email": email }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider(server: &MockServer) -> GotrueProvider {
        GotrueProvider::from(GotrueConfig {
            url: Url::parse(&format!("{}/auth/v1/", server.uri())).unwrap(),
            api_key: "service-key".to_string(),
        })
    }

    #[test]
    fn test_classify_invalid_credentials() {
        let err = classify(
            StatusCode::BAD_REQUEST,
            "Invalid login credentials".to_string(),
        );
        assert!(matches!(err, IdentityError::InvalidCredentials));
    }

    #[test]
    fn test_classify_unconfirmed_email() {
        let err = classify(StatusCode::BAD_REQUEST, "Email not confirmed".to_string());
        assert!(matches!(err, IdentityError::EmailNotConfirmed));

        let err = classify(
            StatusCode::BAD_REQUEST,
            "Please confirm your address".to_string(),
        );
        assert!(matches!(err, IdentityError::EmailNotConfirmed));
    }

    #[test]
    fn test_classify_already_registered() {
        let err = classify(
            StatusCode::UNPROCESSABLE_ENTITY,
            "User already registered".to_string(),
        );
        assert!(matches!(err, IdentityError::AlreadyRegistered));
    }

    #[test]
    fn test_classify_other_provider_error() {
        let err = classify(
            StatusCode::INTERNAL_SERVER_ERROR,
            "database timeout".to_string(),
        );
        assert!(matches!(err, IdentityError::Provider { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_sign_up_pending_confirmation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .and(header("apikey", "service-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "provider-user-1",
                "email": "a@b.com",
                "email_confirmed_at": null
            })))
            .mount(&server)
            .await;

        let result = provider(&server).await.sign_up("a@b.com", "secret").await.unwrap();
        assert_eq!(result.user.id, "provider-user-1");
        assert!(!result.user.email_confirmed);
        assert!(result.session.is_none());
    }

    #[tokio::test]
    async fn test_sign_up_autoconfirm_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/signup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-1",
                "refresh_token": "rt-1",
                "expires_in": 3600,
                "token_type": "bearer",
                "user": {
                    "id": "provider-user-1",
                    "email": "a@b.com",
                    "email_confirmed_at": "2026-01-01T00:00:00Z"
                }
            })))
            .mount(&server)
            .await;

        let result = provider(&server).await.sign_up("a@b.com", "secret").await.unwrap();
        assert!(result.user.email_confirmed);
        let session = result.session.unwrap();
        assert_eq!(session.access_token, "at-1");
        assert_eq!(session.refresh_token, "rt-1");
    }

    #[tokio::test]
    async fn test_sign_in_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-1",
                "refresh_token": "rt-1",
                "expires_in": 3600,
                "token_type": "bearer",
                "user": {
                    "id": "provider-user-1",
                    "email": "a@b.com",
                    "email_confirmed_at": "2026-01-01T00:00:00Z"
                }
            })))
            .mount(&server)
            .await;

        let result = provider(&server).await.sign_in("a@b.com", "secret").await.unwrap();
        assert_eq!(result.session.access_token, "at-1");
        assert_eq!(result.user.id, "provider-user-1");
    }

    #[tokio::test]
    async fn test_sign_in_bad_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Invalid login credentials"
            })))
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .sign_in("a@b.com", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_get_user_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("Authorization", "Bearer user-access-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "provider-user-1",
                "email": "a@b.com",
                "email_confirmed_at": "2026-01-01T00:00:00Z"
            })))
            .mount(&server)
            .await;

        let user = provider(&server)
            .await
            .get_user("user-access-token")
            .await
            .unwrap();
        assert_eq!(user.email, "a@b.com");
        assert!(user.email_confirmed);
    }

    #[tokio::test]
    async fn test_get_user_rejects_invalid_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "msg": "invalid JWT"
            })))
            .mount(&server)
            .await;

        let err = provider(&server).await.get_user("bogus").await.unwrap_err();
        // "invalid JWT" carries no email/confirm wording, so it stays a
        // provider error with the original status.
        assert!(matches!(err, IdentityError::Provider { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_resend_verification() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/resend"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        provider(&server)
            .await
            .resend_verification("a@b.com")
            .await
            .unwrap();
    }
}
