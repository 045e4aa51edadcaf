//! Error types for web handlers.
//!
//! Domain errors convert into [`AppError`], which renders
//! `{"code": ..., "message": ...}`. Server-side failures are logged together
//! with their internal cause; the client only sees [`INTERNAL_ERROR_MESSAGE`].

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;

/// Message shown to clients for every 5xx response.
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred. Please try again.";

/// HTTP-facing error.
///
/// ```ignore
/// async fn handler() -> Result<Json<Post>, AppError> {
///     let post = find_post(&id).await
///         .map_err(|e| AppError::internal().with_source(e.into()))?
///         .ok_or_else(|| AppError::not_found("Post", &id))?;
///     Ok(Json(post))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    /// Logged, never rendered
    source: Option<anyhow::Error>,
}

impl AppError {
    const fn with_code(status: StatusCode, code: &'static str, message: String) -> Self {
        Self {
            status,
            code,
            message,
            source: None,
        }
    }

    /// Attach the internal cause of this error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// 400
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_code(StatusCode::BAD_REQUEST, "BAD_REQUEST", message.into())
    }

    /// 403
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::with_code(StatusCode::FORBIDDEN, "FORBIDDEN", message.into())
    }

    /// 404 naming the missing resource.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::with_code(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{resource} {id} not found"),
        )
    }

    /// 409
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::with_code(StatusCode::CONFLICT, "CONFLICT", message.into())
    }

    /// 500 with the generic client message.
    #[must_use]
    pub fn internal() -> Self {
        Self::with_code(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            INTERNAL_ERROR_MESSAGE.to_string(),
        )
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// Client-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            let cause = self
                .source
                .as_ref()
                .map_or_else(|| "-".to_string(), |source| format!("{source:#}"));
            tracing::error!(status = %self.status, code = self.code, cause = %cause, "Server error");
            metrics::counter!("http_server_errors_total", "code" => self.code).increment(1);
        }

        let body = Json(ErrorBody {
            code: self.code,
            message: &self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal().with_source(err)
    }
}
