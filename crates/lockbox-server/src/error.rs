//! HTTP error types for the Lockbox server.
//!
//! Maps domain errors from `lockbox-core` into HTTP responses. Every error
//! produces a JSON body with a machine-readable `error` field and a
//! human-readable `message`. Persistence failures are logged in full and
//! answered with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use lockbox_core::{DecodeError, IdentityError, StoreError, VaultError};

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Credential missing, invalid or expired.
    Unauthorized(String),
    /// The operation is disabled on this server.
    Forbidden(String),
    /// Requested record not found (or owned by someone else).
    NotFound(String),
    /// Client sent a body that could not be decoded.
    BadRequest(String),
    /// A uniqueness or revision conflict.
    Conflict(String),
    /// Internal server error. The detail is logged, never sent.
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_owned(),
                )
            }
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            StoreError::UniquenessViolation { .. } | StoreError::StaleRevision { .. } => {
                Self::Conflict(err.to_string())
            }
            StoreError::Corrupt { .. }
            | StoreError::SchemaMismatch { .. }
            | StoreError::Storage(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<DecodeError> for AppError {
    fn from(err: DecodeError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::MissingCredential => {
                Self::Unauthorized("missing bearer token".to_owned())
            }
            IdentityError::InvalidCredential { .. } | IdentityError::UnknownAccount => {
                Self::Unauthorized("invalid bearer token".to_owned())
            }
            IdentityError::Expired => Self::Unauthorized(err.to_string()),
        }
    }
}

impl From<VaultError> for AppError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Store(e) => e.into(),
            VaultError::Decode(e) => e.into(),
            VaultError::Identity(e) => e.into(),
        }
    }
}
