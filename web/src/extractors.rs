//! Custom Axum extractors.
//!
//! ```ignore
//! use eventgram_web::extractors::BearerToken;
//!
//! async fn handler(token: BearerToken) -> String {
//!     format!("signed in: {}", token.0.is_some())
//! }
//! ```

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

/// Bearer token from the `Authorization` header, if any.
///
/// A missing or malformed header yields `BearerToken(None)`; deciding whether
/// a caller must be signed in is left to the handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        Ok(Self(token))
    }
}
