//! Application error taxonomy.
//!
//! [`ApiError`] is what reducers record as a failed outcome and what handlers
//! return. It converts into [`AppError`] for rendering; internal failures are
//! logged with their context and reach the caller only as a generic message.

use axum::response::{IntoResponse, Response};
use eventgram_web::AppError;
use std::fmt;
use thiserror::Error;

/// Errors surfaced by Eventgram operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No authenticated caller
    #[error("Not signed in.")]
    NotSignedIn,

    /// Authenticated, but no user record
    #[error("Must register to continue.")]
    NotRegistered,

    /// Malformed or out-of-policy payload
    #[error("{0}")]
    ValidationFailed(String),

    /// Entity absent
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity kind, for the message
        kind: &'static str,
        /// Requested identifier
        id: String,
    },

    /// Caller is not allowed to act on the resource
    #[error("{0}")]
    Forbidden(String),

    /// Duplicate account or username
    #[error("{0}")]
    Conflict(String),

    /// Store, blob or identifier failure
    #[error("{operation} failed: {detail}")]
    Internal {
        /// Operation that failed
        operation: &'static str,
        /// Entity the operation concerned, when known
        id: Option<String>,
        /// Internal cause (logged, never returned)
        detail: String,
    },
}

impl ApiError {
    /// A 400 with the given reason.
    #[must_use]
    pub fn validation(reason: impl fmt::Display) -> Self {
        Self::ValidationFailed(reason.to_string())
    }

    /// A 403 with the given reason.
    #[must_use]
    pub fn forbidden(reason: impl fmt::Display) -> Self {
        Self::Forbidden(reason.to_string())
    }

    /// A 404 for `kind` `id`.
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// A 500 carrying its internal context.
    #[must_use]
    pub fn internal(operation: &'static str, id: Option<&str>, detail: impl fmt::Display) -> Self {
        Self::Internal {
            operation,
            id: id.map(str::to_string),
            detail: detail.to_string(),
        }
    }
}

impl From<ApiError> for AppError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::NotSignedIn | ApiError::NotRegistered | ApiError::Forbidden(_) => {
                Self::forbidden(error.to_string())
            },
            ApiError::ValidationFailed(reason) => Self::bad_request(reason),
            ApiError::NotFound { kind, id } => Self::not_found(kind, id),
            ApiError::Conflict(reason) => Self::conflict(reason),
            ApiError::Internal {
                operation,
                id,
                detail,
            } => {
                tracing::error!(
                    operation,
                    id = id.as_deref().unwrap_or("-"),
                    detail = %detail,
                    "Operation failed"
                );
                Self::internal().with_source(anyhow::anyhow!("{operation}: {detail}"))
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}
