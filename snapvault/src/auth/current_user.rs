//! Bearer-token authentication extractor.
//!
//! Every `/api/images` handler takes a [`CurrentUser`] argument; extraction
//! performs the full authentication contract before any handler code runs:
//!
//! 1. Missing `Authorization: Bearer <token>` header → 401.
//! 2. Token rejected by the identity provider → 403.
//! 3. Provider identity with no application user row → either auto-created
//!    (idempotent upsert keyed by the provider id, the default) or rejected
//!    with 403, depending on `auth.auto_create_users`.

use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use tracing::{debug, instrument, trace};

use crate::{
    AppState,
    api::models::users::CurrentUser,
    db::models::UserCreate,
    errors::{Error, Result},
};

/// Extract the bearer token from the `Authorization` header.
///
/// Returns `None` when the header is absent or not a Bearer credential;
/// errors only on a malformed (non-UTF-8) header value.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>> {
    let Some(auth_header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header.to_str().map_err(|e| Error::BadRequest {
        message: format!("Invalid authorization header: {e}"),
    })?;

    Ok(auth_str.strip_prefix("Bearer "))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = bearer_token(&parts.headers)?.ok_or_else(|| Error::Unauthenticated {
            message: Some("Access token required".to_string()),
        })?;

        // Verify the token with the identity provider
        let identity = match state.identity.get_user(token).await {
            Ok(identity) => identity,
            Err(e) => {
                trace!("Token verification failed: {e}");
                return Err(Error::Forbidden {
                    message: "Invalid or expired token".to_string(),
                });
            }
        };

        // Resolve the provider identity to an application user
        let user = state.db.user_by_auth_id(&identity.id).await?;
        let user = match user {
            Some(user) => user,
            None if state.config.auth.auto_create_users => {
                debug!("Auto-creating application user for provider id");
                state
                    .db
                    .find_or_create_user(&UserCreate {
                        email: identity.email,
                        auth_provider_id: identity.id,
                        email_confirmed: identity.email_confirmed,
                    })
                    .await?
            }
            None => {
                return Err(Error::Forbidden {
                    message: "User not found in application database".to_string(),
                });
            }
        };

        Ok(CurrentUser::from(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::FromRequestParts as _;
    use axum::http::StatusCode;

    use crate::db::MetadataStore;
    use crate::identity::IdentityProvider;
    use crate::test_utils::{TestBackends, create_test_state};

    fn parts_with_header(header_value: Option<&str>) -> Parts {
        let mut builder = axum::http::Request::builder().uri("http://localhost/api/images");
        if let Some(value) = header_value {
            builder = builder.header("authorization", value);
        }
        let (parts, _body) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() {
        let (state, _backends) = create_test_state(|_| {});

        let mut parts = parts_with_header(None);
        let err = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_non_bearer_header_is_unauthorized() {
        let (state, _backends) = create_test_state(|_| {});

        let mut parts = parts_with_header(Some("Basic dXNlcjpwYXNz"));
        let err = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_token_is_forbidden() {
        let (state, _backends) = create_test_state(|_| {});

        let mut parts = parts_with_header(Some("Bearer bogus-token"));
        let err = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_valid_token_auto_creates_user() {
        let (state, backends) = create_test_state(|_| {});
        let TestBackends { identity, db, .. } = &backends;

        identity.sign_up("a@b.com", "secret").await.unwrap();
        let signin = identity.sign_in("a@b.com", "secret").await.unwrap();

        // No application row yet.
        assert!(db.user_by_email("a@b.com").await.unwrap().is_none());

        let mut parts = parts_with_header(Some(&format!("Bearer {}", signin.session.access_token)));
        let current_user = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(current_user.email, "a@b.com");

        // Row was created and maps back to the provider identity.
        let row = db.user_by_email("a@b.com").await.unwrap().unwrap();
        assert_eq!(row.id, current_user.id);
        assert_eq!(row.auth_provider_id, signin.user.id);

        // Extraction is idempotent: same row on the next request.
        let mut parts = parts_with_header(Some(&format!("Bearer {}", signin.session.access_token)));
        let again = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(again.id, current_user.id);
    }

    #[tokio::test]
    async fn test_strict_policy_rejects_unknown_user() {
        let (state, backends) = create_test_state(|config| {
            config.auth.auto_create_users = false;
        });
        let TestBackends { identity, db, .. } = &backends;

        identity.sign_up("a@b.com", "secret").await.unwrap();
        let signin = identity.sign_in("a@b.com", "secret").await.unwrap();

        let mut parts = parts_with_header(Some(&format!("Bearer {}", signin.session.access_token)));
        let err = CurrentUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert!(db.user_by_email("a@b.com").await.unwrap().is_none());
    }
}
