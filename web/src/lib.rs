//! Axum web framework integration for Eventgram.
//!
//! This crate is the shared part of the imperative shell: the JSON error
//! type, request-context middleware, the bearer-token extractor and the
//! liveness handler.
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives at an Axum handler (inside the request span)
//! 2. **Extract data** from the request (caller, path, JSON body)
//! 3. **Build Action** from the extracted data
//! 4. **Dispatch** the action through a request-scoped `Store`
//! 5. **Execute effects** (entity store, blob store, task queue)
//! 6. **Map the outcome** to an HTTP response or an [`AppError`]
//!
//! # Example
//!
//! ```ignore
//! use eventgram_web::{AppError, request_context_layer};
//! use axum::{Router, routing::post, Json};
//!
//! async fn create_post(
//!     State(state): State<AppState>,
//!     Caller(actor): Caller,
//!     JsonBody(request): JsonBody<PostRequest>,
//! ) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
//!     let post = posts::create(&state, actor, request).await?;
//!     Ok((StatusCode::CREATED, Json(CreatedResponse::new(post.id))))
//! }
//!
//! let app = Router::new()
//!     .route("/p", post(create_post))
//!     .layer(request_context_layer())
//!     .with_state(app_state);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::BearerToken;
pub use middleware::{REQUEST_ID_HEADER, request_context_layer};
