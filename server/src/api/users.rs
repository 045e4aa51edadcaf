//! User endpoints.
//!
//! - `POST /u` - register the signed-in identity
//! - `GET /u/:username` - profile; private profiles for their owner only
//! - `PUT /u/:username` - update or rename (owner)
//! - `DELETE /u/:username` - delete the account (owner)
//! - `GET /u/:username/posts` - newest posts of the user

use super::{DataResponse, JsonBody, OkResponse, accept_body, post_views};
use crate::aggregates::dispatch;
use crate::aggregates::user::{UserAction, UserReducer, UserState, normalize_username};
use crate::auth::{Caller, can_view_user};
use crate::error::ApiError;
use crate::server::AppState;
use crate::storage::repo;
use crate::types::{AppUser, Post, PostView, UserRequest, UserView};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use eventgram_core::entity_store::{Direction, Entity, Query};

/// Loads the user holding `username`.
async fn find_by_username(state: &AppState, username: &str) -> Result<Option<AppUser>, ApiError> {
    let query = Query::new(AppUser::KIND)
        .filter("username", normalize_username(username))
        .limit(1);
    let mut users = repo::find::<AppUser>(state.entities.as_ref(), query)
        .await
        .map_err(|e| ApiError::internal("find_user", Some(username), e))?;
    Ok(users.pop())
}

async fn visible_user(state: &AppState, caller: &Caller, username: &str) -> Result<AppUser, ApiError> {
    let user = find_by_username(state, username)
        .await?
        .ok_or_else(|| ApiError::not_found("User", username))?;
    if !can_view_user(&user, &caller.0) {
        return Err(ApiError::forbidden("This profile is private."));
    }
    Ok(user)
}

/// Register an account for the signed-in identity.
///
/// ```bash
/// curl -X POST http://localhost:8080/u \
///   -H "Authorization: Bearer <token>" \
///   -d '{"username":"ada","firstName":"Ada","lastName":"Lovelace"}'
/// ```
pub async fn register_user(
    Caller(actor): Caller,
    State(state): State<AppState>,
    body: Result<JsonBody<UserRequest>, ApiError>,
) -> Result<(StatusCode, Json<DataResponse<UserView>>), ApiError> {
    let request = accept_body(body, actor.signed_in())?;

    let settled = dispatch(
        UserReducer::new(),
        UserState::new(actor),
        state.user_env(),
        UserAction::RegisterUser { request },
    )
    .await?;
    let user = settled.outcome.into_result("register_user")?;

    Ok((StatusCode::CREATED, Json(DataResponse::new(user.into()))))
}

/// Get a profile.
pub async fn get_user(
    caller: Caller,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<UserView>, ApiError> {
    let user = visible_user(&state, &caller, &username).await?;
    Ok(Json(user.into()))
}

/// Update or rename an account.
pub async fn update_user(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(username): Path<String>,
    body: Result<JsonBody<UserRequest>, ApiError>,
) -> Result<Json<UserView>, ApiError> {
    let request = accept_body(body, actor.signed_in())?;
    let current = find_by_username(&state, &username).await?;

    let settled = dispatch(
        UserReducer::new(),
        UserState::new(actor).with_current(current),
        state.user_env(),
        UserAction::UpdateUser { username, request },
    )
    .await?;
    let user = settled.outcome.into_result("update_user")?;

    Ok(Json(user.into()))
}

/// Delete an account.
pub async fn delete_user(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    actor.signed_in()?;
    let current = find_by_username(&state, &username).await?;

    let settled = dispatch(
        UserReducer::new(),
        UserState::new(actor).with_current(current),
        state.user_env(),
        UserAction::DeleteUser { username },
    )
    .await?;
    settled.outcome.into_result("delete_user")?;

    Ok(Json(OkResponse::ok()))
}

/// Newest posts of a user, one page.
pub async fn user_posts(
    caller: Caller,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Vec<PostView>>, ApiError> {
    let user = visible_user(&state, &caller, &username).await?;

    let query = Query::new(Post::KIND)
        .filter("user", user.id.as_str())
        .order_by("posted", Direction::Descending)
        .limit(state.config.policy.feed_page_size);
    let posts = repo::find::<Post>(state.entities.as_ref(), query)
        .await
        .map_err(|e| ApiError::internal("user_posts", Some(user.id.as_str()), e))?;

    Ok(Json(post_views(&state, posts).await?))
}
