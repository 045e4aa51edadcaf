//! Post endpoints.
//!
//! - `POST /p` - create a post on an active event
//! - `GET /p/:id` - post view with the author's username
//! - `PUT /p/:id` - change the text (owner, active event)
//! - `POST /p/:id/attach` - attach an image once (owner)
//! - `DELETE /p/:id` - delete with its image (owner)

use super::{CreatedResponse, JsonBody, OkResponse, accept_body, load};
use crate::aggregates::dispatch;
use crate::aggregates::post::{PostAction, PostReducer, PostState};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{AppUser, Event, Post, PostId, PostRequest, PostView};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};

async fn referenced_event(state: &AppState, post: Option<&Post>) -> Result<Option<Event>, ApiError> {
    match post {
        Some(post) => load::<Event>(state, "load_event", post.event.as_str()).await,
        None => Ok(None),
    }
}

async fn view(state: &AppState, post: Post) -> Result<PostView, ApiError> {
    let author = load::<AppUser>(state, "load_author", post.user.as_str())
        .await?
        .ok_or_else(|| ApiError::not_found("Post", &post.id))?;
    Ok(PostView::new(post, author.username))
}

/// Create a post.
///
/// ```bash
/// curl -X POST http://localhost:8080/p \
///   -H "Authorization: Bearer <token>" \
///   -d '{"event":"<event id>","text":"first!"}'
/// ```
pub async fn create_post(
    Caller(actor): Caller,
    State(state): State<AppState>,
    body: Result<JsonBody<PostRequest>, ApiError>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let request = accept_body(body, actor.signed_in())?;
    let event = match &request.event {
        Some(event_id) => load::<Event>(&state, "create_post", event_id.as_str()).await?,
        None => None,
    };

    let settled = dispatch(
        PostReducer::new(),
        PostState::new(actor).with_event(event),
        state.post_env(),
        PostAction::CreatePost { request },
    )
    .await?;
    let post = settled.outcome.into_result("create_post")?;

    Ok((StatusCode::CREATED, Json(CreatedResponse::new(post.id.as_str()))))
}

/// Get a post.
///
/// A post whose author no longer exists is reported missing.
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PostView>, ApiError> {
    let post = load::<Post>(&state, "get_post", &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Post", &id))?;
    Ok(Json(view(&state, post).await?))
}

/// Update the text of a post.
pub async fn update_post(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<JsonBody<PostRequest>, ApiError>,
) -> Result<Json<PostView>, ApiError> {
    let request = accept_body(body, actor.signed_in())?;
    let current = load::<Post>(&state, "update_post", &id).await?;
    let event = referenced_event(&state, current.as_ref()).await?;

    let settled = dispatch(
        PostReducer::new(),
        PostState::new(actor).with_event(event).with_current(current),
        state.post_env(),
        PostAction::UpdatePost {
            post_id: PostId::new(id),
            request,
        },
    )
    .await?;
    let post = settled.outcome.into_result("update_post")?;

    Ok(Json(view(&state, post).await?))
}

/// Attach an image to a post.
///
/// The body is the raw image (PNG, JPEG or GIF).
///
/// ```bash
/// curl -X POST http://localhost:8080/p/<post id>/attach \
///   -H "Authorization: Bearer <token>" \
///   --data-binary @photo.jpg
/// ```
pub async fn attach_image(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<PostView>, ApiError> {
    actor.signed_in()?;
    let current = load::<Post>(&state, "attach_image", &id).await?;

    let settled = dispatch(
        PostReducer::new(),
        PostState::new(actor).with_current(current),
        state.post_env(),
        PostAction::AttachImage {
            post_id: PostId::new(id),
            data: body.to_vec(),
        },
    )
    .await?;
    let post = settled.outcome.into_result("attach_image")?;

    Ok(Json(view(&state, post).await?))
}

/// Delete a post and its image.
pub async fn delete_post(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    actor.signed_in()?;
    let current = load::<Post>(&state, "delete_post", &id).await?;

    let settled = dispatch(
        PostReducer::new(),
        PostState::new(actor).with_current(current),
        state.post_env(),
        PostAction::DeletePost {
            post_id: PostId::new(id),
        },
    )
    .await?;
    settled.outcome.into_result("delete_post")?;

    Ok(Json(OkResponse::ok()))
}
