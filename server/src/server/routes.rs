//! Router configuration for Eventgram.

use super::health::readiness_check;
use super::state::AppState;
use crate::api::{events, posts, users};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use eventgram_web::handlers::health_check;
use eventgram_web::request_context_layer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

/// Build the complete Axum router.
///
/// - `/health`, `/ready`: probes (no authentication)
/// - `/e`, `/feed/e`: events and the public feed
/// - `/p`: posts and image attachment
/// - `/u`: accounts
///
/// Image uploads are limited to `IMAGE_MAX_UPLOAD_BYTES`; every other body
/// keeps axum's default limit.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.images.max_upload_bytes;

    let event_routes = Router::new()
        .route("/e", post(events::create_event))
        .route(
            "/e/:id",
            get(events::get_event)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route("/e/:id/posts", get(events::event_posts))
        .route("/feed/e", get(events::feed))
        .route("/feed/e/:page", get(events::feed_page))
        .route("/feed/e/:order/:page", get(events::feed_ordered));

    let post_routes = Router::new()
        .route("/p", post(posts::create_post))
        .route(
            "/p/:id",
            get(posts::get_post)
                .put(posts::update_post)
                .delete(posts::delete_post),
        )
        .route(
            "/p/:id/attach",
            post(posts::attach_image)
                .layer::<_, std::convert::Infallible>(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(upload_limit)),
        );

    let user_routes = Router::new()
        .route("/u", post(users::register_user))
        .route(
            "/u/:username",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/u/:username/posts", get(users::user_posts));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .merge(event_routes)
        .merge(post_routes)
        .merge(user_routes)
        .layer(request_context_layer())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
