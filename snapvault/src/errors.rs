use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

use crate::db::errors::DbError;
use crate::identity::IdentityError;
use crate::storage::StorageError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided, or credentials rejected
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Token was presented but does not resolve to a usable identity
    #[error("{message}")]
    Forbidden { message: String },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found (scoped by ownership; never distinguishes
    /// "exists but not yours" from "does not exist")
    #[error("{resource} not found")]
    NotFound { resource: String },

    /// Duplicate account. The public API reports this as 400, matching the
    /// original contract, but the taxonomy keeps the case distinct.
    #[error("{message}")]
    Conflict { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Identity provider call failed
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Object storage call failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Metadata store operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::BAD_REQUEST,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Identity(err) => match err {
                IdentityError::InvalidCredentials | IdentityError::EmailNotConfirmed => {
                    StatusCode::UNAUTHORIZED
                }
                IdentityError::AlreadyRegistered => StatusCode::BAD_REQUEST,
                IdentityError::Provider { .. } | IdentityError::Transport(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message
                .clone()
                .unwrap_or_else(|| "Authentication required".to_string()),
            Error::Forbidden { message } => message.clone(),
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource } => format!("{resource} not found"),
            Error::Conflict { message } => message.clone(),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Identity(err) => match err {
                IdentityError::InvalidCredentials
                | IdentityError::EmailNotConfirmed
                | IdentityError::AlreadyRegistered => err.to_string(),
                IdentityError::Provider { .. } | IdentityError::Transport(_) => {
                    "Authentication service unavailable".to_string()
                }
            },
            Error::Storage(_) => "Storage service unavailable".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { constraint, table, .. } => {
                    match (table.as_deref(), constraint.as_deref()) {
                        (Some("users"), Some(c)) if c.contains("email") => {
                            "An account with this email address already exists".to_string()
                        }
                        _ => "Resource already exists".to_string(),
                    }
                }
                DbError::ForeignKeyViolation { .. } => {
                    "Invalid reference to related resource".to_string()
                }
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Internal { .. }
            | Error::Other(_)
            | Error::Database(DbError::Other(_))
            | Error::Storage(_)
            | Error::Identity(IdentityError::Provider { .. })
            | Error::Identity(IdentityError::Transport(_)) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::Forbidden { .. } | Error::Identity(_) => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } | Error::Conflict { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = Json(json!({ "error": self.user_message() }));
        (status, body).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (
                Error::Unauthenticated {
                    message: Some("Access token required".to_string()),
                },
                StatusCode::UNAUTHORIZED,
            ),
            (
                Error::Forbidden {
                    message: "Invalid or expired token".to_string(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                Error::BadRequest {
                    message: "Invalid email format".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                Error::NotFound {
                    resource: "Image".to_string(),
                },
                StatusCode::NOT_FOUND,
            ),
            // The original API reports duplicate accounts as 400.
            (
                Error::Conflict {
                    message: "already exists".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                Error::Identity(IdentityError::InvalidCredentials),
                StatusCode::UNAUTHORIZED,
            ),
            (
                Error::Identity(IdentityError::Provider {
                    status: 502,
                    message: "down".to_string(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (Error::Database(DbError::NotFound), StatusCode::NOT_FOUND),
        ];
        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{error:?}");
        }
    }

    #[test]
    fn test_internal_details_not_leaked() {
        let err = Error::Internal {
            operation: "connect to postgres at 10.0.0.3".to_string(),
        };
        assert_eq!(err.user_message(), "Internal server error");

        let err = Error::Database(DbError::Other(anyhow::anyhow!("connection refused")));
        assert_eq!(err.user_message(), "Database error occurred");
    }

    #[test]
    fn test_duplicate_email_message() {
        let err = Error::Database(DbError::UniqueViolation {
            constraint: Some("users_email_key".to_string()),
            table: Some("users".to_string()),
            message: "duplicate key".to_string(),
        });
        assert_eq!(
            err.user_message(),
            "An account with this email address already exists"
        );
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
