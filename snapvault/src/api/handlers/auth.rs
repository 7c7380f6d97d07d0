//! Account lifecycle handlers: signup, login, email confirmation, and repair.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    AppState,
    api::models::{
        MessageResponse,
        auth::{
            EmailRequest, LoginRequest, LoginResponse, ManualConfirmResponse, RepairUserResponse,
            SignupRequest, SignupResponse, VerifyCodeRequest, VerifyResponse,
        },
        users::{CurrentUser, UserResponse},
    },
    auth::{bearer_token, confirmation},
    db::models::UserCreate,
    errors::{Error, Result},
    identity::IdentityError,
};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid"));

fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

fn is_test_domain(domains: &[String], email: &str) -> bool {
    email
        .rsplit_once('@')
        .is_some_and(|(_, domain)| domains.iter().any(|d| d.eq_ignore_ascii_case(domain)))
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    tag = "authentication",
    responses(
        (status = 201, description = "User created successfully", body = SignupResponse),
        (status = 400, description = "Invalid input or account already exists"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>)> {
    if request.email.is_empty() || request.password.is_empty() {
        return Err(Error::BadRequest {
            message: "Email and password are required".to_string(),
        });
    }
    if !is_valid_email(&request.email) {
        return Err(Error::BadRequest {
            message: "Invalid email format".to_string(),
        });
    }

    let password_config = &state.config.auth.password;
    if request.password.len() < password_config.min_length {
        return Err(Error::BadRequest {
            message: format!(
                "Password must be at least {} characters",
                password_config.min_length
            ),
        });
    }
    if request.password.len() > password_config.max_length {
        return Err(Error::BadRequest {
            message: format!(
                "Password must be no more than {} characters",
                password_config.max_length
            ),
        });
    }

    // Check our own records before touching the identity provider.
    if state.db.user_by_email(&request.email).await?.is_some() {
        return Err(Error::Conflict {
            message: "An account with this email address already exists".to_string(),
        });
    }

    let signup = state
        .identity
        .sign_up(&request.email, &request.password)
        .await
        .map_err(|e| match e {
            IdentityError::AlreadyRegistered => Error::Conflict {
                message: "An account with this email address already exists".to_string(),
            },
            IdentityError::Provider { status, message } if status < 500 => {
                Error::BadRequest { message }
            }
            other => Error::Identity(other),
        })?;

    // The identity-provider account exists from here on. A failed metadata
    // insert is logged and the signup still reports success; the row is
    // recreated lazily on the first authenticated request.
    let user = match state
        .db
        .create_user(&UserCreate {
            email: request.email.clone(),
            auth_provider_id: signup.user.id.clone(),
            email_confirmed: false,
        })
        .await
    {
        Ok(user) => Some(UserResponse::from(user)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to store application user after signup");
            None
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User created successfully".to_string(),
            user,
            session: signup.session.map(Into::into),
        }),
    ))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials or unconfirmed email"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    if request.email.is_empty() || request.password.is_empty() {
        return Err(Error::BadRequest {
            message: "Email and password are required".to_string(),
        });
    }

    let signin = state
        .identity
        .sign_in(&request.email, &request.password)
        .await
        .map_err(|e| match e {
            IdentityError::InvalidCredentials => Error::Unauthenticated {
                message: Some("invalid email or password".to_string()),
            },
            IdentityError::EmailNotConfirmed => Error::Unauthenticated {
                message: Some("please confirm your email before logging in".to_string()),
            },
            other => Error::Identity(other),
        })?;

    // Self-healing: create the application row if it has gone missing.
    let user = state
        .db
        .find_or_create_user(&UserCreate {
            email: request.email.clone(),
            auth_provider_id: signin.user.id.clone(),
            email_confirmed: signin.user.email_confirmed,
        })
        .await?;

    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        user: user.into(),
        access_token: signin.session.access_token,
        refresh_token: signin.session.refresh_token,
    }))
}

/// Re-send the provider's verification email
#[utoipa::path(
    post,
    path = "/auth/resend-verification",
    request_body = EmailRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Verification email resent", body = MessageResponse),
        (status = 400, description = "Unknown email or provider rejection"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<MessageResponse>> {
    if request.email.is_empty() {
        return Err(Error::BadRequest {
            message: "Email is required".to_string(),
        });
    }

    let user = state
        .db
        .user_by_email(&request.email)
        .await?
        .ok_or_else(|| Error::BadRequest {
            message: "No account found for this email address".to_string(),
        })?;

    // Designated test domains skip the provider round-trip entirely.
    if is_test_domain(&state.config.auth.test_email_domains, &user.email) {
        state.db.confirm_email(user.id).await?;
        return Ok(Json(MessageResponse::new(
            "Test account confirmed automatically.",
        )));
    }

    state
        .identity
        .resend_verification(&user.email)
        .await
        .map_err(|e| match e {
            IdentityError::Provider { status, message } if status < 500 => {
                Error::BadRequest { message }
            }
            other => Error::Identity(other),
        })?;

    Ok(Json(MessageResponse::new(
        "Verification email resent successfully. Please check your inbox.",
    )))
}

/// Verify a bearer token and return the resolved user
#[utoipa::path(
    get,
    path = "/auth/verify",
    tag = "authentication",
    responses(
        (status = 200, description = "Token is valid", body = VerifyResponse),
        (status = 401, description = "Missing token"),
        (status = 403, description = "Invalid or expired token"),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn verify_token(current_user: CurrentUser) -> Result<Json<VerifyResponse>> {
    Ok(Json(VerifyResponse {
        valid: true,
        user: current_user,
    }))
}

/// Lazily create the application user row for a valid token
///
/// Idempotent: returns the existing row unchanged when present. Reads the
/// token by hand instead of using the auth extractor so that repair works
/// even when `auth.auto_create_users` is disabled.
#[utoipa::path(
    post,
    path = "/auth/repair-user",
    tag = "authentication",
    responses(
        (status = 200, description = "Application user present", body = RepairUserResponse),
        (status = 401, description = "Missing token"),
        (status = 403, description = "Invalid or expired token"),
        (status = 500, description = "Internal server error"),
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn repair_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RepairUserResponse>> {
    let token = bearer_token(&headers)?.ok_or_else(|| Error::Unauthenticated {
        message: Some("Access token required".to_string()),
    })?;

    let identity = state
        .identity
        .get_user(token)
        .await
        .map_err(|_| Error::Forbidden {
            message: "Invalid or expired token".to_string(),
        })?;

    let user = state
        .db
        .find_or_create_user(&UserCreate {
            email: identity.email,
            auth_provider_id: identity.id,
            email_confirmed: identity.email_confirmed,
        })
        .await?;

    Ok(Json(RepairUserResponse {
        message: "Application user present".to_string(),
        user: user.into(),
    }))
}

/// Issue an out-of-band confirmation code
#[utoipa::path(
    post,
    path = "/auth/manual-confirm",
    request_body = EmailRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Code issued", body = ManualConfirmResponse),
        (status = 400, description = "Unknown email"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn manual_confirm(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<ManualConfirmResponse>> {
    if request.email.is_empty() {
        return Err(Error::BadRequest {
            message: "Email is required".to_string(),
        });
    }

    let user = state
        .db
        .user_by_email(&request.email)
        .await?
        .ok_or_else(|| Error::BadRequest {
            message: "No account found for this email address".to_string(),
        })?;

    let code = confirmation::generate_code();
    let ttl = chrono::Duration::from_std(state.config.auth.confirmation_code_ttl)
        .map_err(|e| Error::Internal {
            operation: format!("convert confirmation code TTL: {e}"),
        })?;
    let expiry = Utc::now() + ttl;

    state.db.set_confirmation_code(user.id, &code, expiry).await?;

    Ok(Json(ManualConfirmResponse {
        message: "Confirmation code issued".to_string(),
        code,
        expiry,
    }))
}

/// Verify an out-of-band confirmation code
#[utoipa::path(
    post,
    path = "/auth/verify-manual-confirmation",
    request_body = VerifyCodeRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Email confirmed", body = MessageResponse),
        (status = 400, description = "Invalid or expired code"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn verify_manual_confirmation(
    State(state): State<AppState>,
    Json(request): Json<VerifyCodeRequest>,
) -> Result<Json<MessageResponse>> {
    if request.email.is_empty() || request.code.is_empty() {
        return Err(Error::BadRequest {
            message: "Email and code are required".to_string(),
        });
    }

    let user = state
        .db
        .user_by_email(&request.email)
        .await?
        .ok_or_else(|| Error::BadRequest {
            message: "No account found for this email address".to_string(),
        })?;

    match confirmation::check_code(
        user.confirmation_code.as_deref(),
        user.confirmation_expires_at,
        &request.code,
        Utc::now(),
    ) {
        confirmation::CodeCheck::Valid => {
            state.db.confirm_email(user.id).await?;
            Ok(Json(MessageResponse::new("Email confirmed successfully")))
        }
        // Expired codes are left in place so the expiry error stays stable
        // until a new code is issued.
        confirmation::CodeCheck::Expired => Err(Error::BadRequest {
            message: "Confirmation code has expired".to_string(),
        }),
        confirmation::CodeCheck::Invalid => Err(Error::BadRequest {
            message: "Invalid confirmation code".to_string(),
        }),
    }
}

/// Metadata store connectivity check
#[utoipa::path(
    get,
    path = "/auth/test-db",
    tag = "authentication",
    responses(
        (status = 200, description = "Database reachable", body = MessageResponse),
        (status = 500, description = "Database unreachable"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn test_db(State(state): State<AppState>) -> Result<Json<MessageResponse>> {
    state.db.ping().await?;
    Ok(Json(MessageResponse::new("Database connection OK")))
}
