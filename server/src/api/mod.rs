//! HTTP handlers.
//!
//! Handlers are the imperative shell around the aggregates: resolve the
//! caller, load the records a decision needs, dispatch one command and map
//! the settled outcome to a response.
//!
//! - `events`: `/e`, `/e/:id`, `/e/:id/posts` and the `/feed/e` listings
//! - `posts`: `/p`, `/p/:id`, `/p/:id/attach`
//! - `users`: `/u`, `/u/:username`, `/u/:username/posts`

pub mod events;
pub mod posts;
pub mod users;

use crate::error::ApiError;
use crate::server::AppState;
use crate::storage::repo;
use crate::types::{AppUser, Post, PostView, UserId};
use axum::{
    Json, async_trait,
    extract::{FromRequest, Request},
};
use eventgram_core::entity_store::Entity;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

// ============================================================================
// Request/Response Types
// ============================================================================

/// JSON request body whose rejection is an [`ApiError`].
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection, "Rejected request body");
                Err(ApiError::validation("Request body is not valid JSON."))
            },
        }
    }
}

/// Unwraps a body once the caller passed `caller_check`.
///
/// An unauthenticated request is reported as such even when its body is
/// also malformed.
///
/// # Errors
///
/// The caller check failure, then the body rejection.
pub fn accept_body<T>(
    body: Result<JsonBody<T>, ApiError>,
    caller_check: Result<(), ApiError>,
) -> Result<T, ApiError> {
    caller_check?;
    body.map(|JsonBody(value)| value)
}

/// `201` body of event and post creation.
#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    /// Always `true`
    pub ok: bool,
    /// Identifier of the new entity
    pub id: String,
}

impl CreatedResponse {
    /// Response for the entity `id`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            ok: true,
            id: id.into(),
        }
    }
}

/// Plain acknowledgement.
#[derive(Debug, Serialize)]
pub struct OkResponse {
    /// Always `true`
    pub ok: bool,
}

impl OkResponse {
    /// `{"ok": true}`
    #[must_use]
    pub const fn ok() -> Self {
        Self { ok: true }
    }
}

/// Acknowledgement carrying a payload.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    /// Always `true`
    pub ok: bool,
    /// Payload
    pub data: T,
}

impl<T> DataResponse<T> {
    /// Wraps `data`.
    pub const fn new(data: T) -> Self {
        Self { ok: true, data }
    }
}

/// Body of an event deletion.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedEventResponse {
    /// Always `true`
    pub ok: bool,
    /// Posts removed with the event
    pub posts_deleted: usize,
}

// ============================================================================
// Shared loading
// ============================================================================

/// Loads the record `T` with `id`, mapping store failures to 500.
///
/// # Errors
///
/// [`ApiError::Internal`] when the store fails.
pub async fn load<T: Entity>(
    state: &AppState,
    operation: &'static str,
    id: &str,
) -> Result<Option<T>, ApiError> {
    repo::fetch::<T>(state.entities.as_ref(), id)
        .await
        .map_err(|e| ApiError::internal(operation, Some(id), e))
}

/// Resolves the author of each post; posts whose author is gone are left out.
///
/// # Errors
///
/// [`ApiError::Internal`] when the store fails.
pub async fn post_views(state: &AppState, posts: Vec<Post>) -> Result<Vec<PostView>, ApiError> {
    let mut usernames: HashMap<UserId, Option<String>> = HashMap::new();
    let mut views = Vec::with_capacity(posts.len());

    for post in posts {
        if !usernames.contains_key(&post.user) {
            let author = load::<AppUser>(state, "load_author", post.user.as_str()).await?;
            usernames.insert(post.user.clone(), author.map(|user| user.username));
        }
        match usernames.get(&post.user).cloned().flatten() {
            Some(username) => views.push(PostView::new(post, username)),
            None => tracing::debug!(post_id = %post.id, "Skipping post without author"),
        }
    }
    Ok(views)
}
