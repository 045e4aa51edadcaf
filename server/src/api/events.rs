//! Event endpoints.
//!
//! - `POST /e` - create an event (registered users)
//! - `GET /e/:id` - event view; private events for their creator only
//! - `PUT /e/:id` - update (creator only)
//! - `DELETE /e/:id` - delete with its posts (creator only)
//! - `GET /e/:id/posts` - newest posts of the event
//! - `GET /feed/e`, `/feed/e/:page`, `/feed/e/:order/:page` - public events

use super::{
    CreatedResponse, DeletedEventResponse, JsonBody, accept_body, load, post_views,
};
use crate::aggregates::dispatch;
use crate::aggregates::event::{EventAction, EventReducer, EventState};
use crate::auth::{Caller, can_view_event};
use crate::error::ApiError;
use crate::server::AppState;
use crate::storage::repo;
use crate::types::{Event, EventId, EventRequest, EventView, Post, PostView};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use eventgram_core::entity_store::{Direction, Entity, Query};
use eventgram_core::environment::Clock;

// ============================================================================
// Feed ordering
// ============================================================================

/// Sort order of the event feed, parsed from the `:order` path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOrder {
    /// By creation time
    Created(Direction),
    /// By end of the window
    End(Direction),
}

impl Default for FeedOrder {
    fn default() -> Self {
        Self::Created(Direction::Descending)
    }
}

impl FeedOrder {
    /// Parses `created`, `-created`, `end` or `-end` (any case).
    ///
    /// A leading `-` sorts descending. Anything else is the default, newest
    /// first.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_ascii_lowercase();
        let (direction, field) = match raw.strip_prefix('-') {
            Some(field) => (Direction::Descending, field),
            None => (Direction::Ascending, raw.as_str()),
        };
        match field {
            "created" => Self::Created(direction),
            "end" => Self::End(direction),
            _ => Self::default(),
        }
    }

    /// Record field sorted on.
    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::End(_) => "end",
        }
    }

    /// Sort direction.
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::Created(direction) | Self::End(direction) => direction,
        }
    }
}

/// Zero-based page number; anything unparseable is page 0.
#[must_use]
pub fn parse_page(raw: &str) -> usize {
    raw.trim().parse().unwrap_or(0)
}

// ============================================================================
// Handlers
// ============================================================================

/// Create an event.
///
/// ```bash
/// curl -X POST http://localhost:8080/e \
///   -H "Authorization: Bearer <token>" \
///   -d '{"name":"Launch","desc":"Rooftop","start":"2025-06-01T18:00:00Z","end":"2025-06-01T23:00:00Z"}'
/// ```
pub async fn create_event(
    Caller(actor): Caller,
    State(state): State<AppState>,
    body: Result<JsonBody<EventRequest>, ApiError>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError> {
    let request = accept_body(body, actor.signed_in())?;

    let settled = dispatch(
        EventReducer::new(),
        EventState::new(actor),
        state.event_env(),
        EventAction::CreateEvent { request },
    )
    .await?;
    let event = settled.outcome.into_result("create_event")?;

    Ok((StatusCode::CREATED, Json(CreatedResponse::new(event.id.as_str()))))
}

async fn visible_event(state: &AppState, caller: &Caller, id: &str) -> Result<Event, ApiError> {
    let event = load::<Event>(state, "get_event", id)
        .await?
        .ok_or_else(|| ApiError::not_found("Event", id))?;
    if !can_view_event(&event, &caller.0) {
        return Err(ApiError::forbidden("This event is private."));
    }
    Ok(event)
}

/// Get an event with its activity at the time of the read.
pub async fn get_event(
    caller: Caller,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EventView>, ApiError> {
    let event = visible_event(&state, &caller, &id).await?;
    Ok(Json(EventView::at(event, state.clock.now(), &state.policy)))
}

/// Update an event.
pub async fn update_event(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<JsonBody<EventRequest>, ApiError>,
) -> Result<Json<EventView>, ApiError> {
    let request = accept_body(body, actor.signed_in())?;
    let current = load::<Event>(&state, "update_event", &id).await?;

    let settled = dispatch(
        EventReducer::new(),
        EventState::new(actor).with_current(current),
        state.event_env(),
        EventAction::UpdateEvent {
            event_id: EventId::new(id),
            request,
        },
    )
    .await?;
    let event = settled.outcome.into_result("update_event")?;

    Ok(Json(EventView::at(event, state.clock.now(), &state.policy)))
}

/// Delete an event and every post that references it.
pub async fn delete_event(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeletedEventResponse>, ApiError> {
    actor.signed_in()?;
    let current = load::<Event>(&state, "delete_event", &id).await?;

    let settled = dispatch(
        EventReducer::new(),
        EventState::new(actor).with_current(current),
        state.event_env(),
        EventAction::DeleteEvent {
            event_id: EventId::new(id),
        },
    )
    .await?;
    let posts_deleted = settled.posts_deleted;
    settled.outcome.into_result("delete_event")?;

    Ok(Json(DeletedEventResponse {
        ok: true,
        posts_deleted,
    }))
}

/// Newest posts of an event, one page.
pub async fn event_posts(
    caller: Caller,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PostView>>, ApiError> {
    let event = visible_event(&state, &caller, &id).await?;

    let query = Query::new(Post::KIND)
        .filter("event", event.id.as_str())
        .order_by("posted", Direction::Descending)
        .limit(state.config.policy.feed_page_size);
    let posts = repo::find::<Post>(state.entities.as_ref(), query)
        .await
        .map_err(|e| ApiError::internal("event_posts", Some(id.as_str()), e))?;

    Ok(Json(post_views(&state, posts).await?))
}

async fn list_feed(
    state: &AppState,
    order: FeedOrder,
    page: usize,
) -> Result<Json<Vec<EventView>>, ApiError> {
    let page_size = state.config.policy.feed_page_size;
    let query = Query::new(Event::KIND)
        .filter("private", false)
        .order_by(order.field(), order.direction())
        .limit(page_size)
        .offset(page.saturating_mul(page_size));

    let events = repo::find::<Event>(state.entities.as_ref(), query)
        .await
        .map_err(|e| ApiError::internal("event_feed", None, e))?;

    let now = state.clock.now();
    Ok(Json(
        events
            .into_iter()
            .map(|event| EventView::at(event, now, &state.policy))
            .collect(),
    ))
}

/// First page of public events, newest first.
pub async fn feed(State(state): State<AppState>) -> Result<Json<Vec<EventView>>, ApiError> {
    list_feed(&state, FeedOrder::default(), 0).await
}

/// A page of public events, newest first.
pub async fn feed_page(
    State(state): State<AppState>,
    Path(page): Path<String>,
) -> Result<Json<Vec<EventView>>, ApiError> {
    list_feed(&state, FeedOrder::default(), parse_page(&page)).await
}

/// A page of public events in the requested order.
pub async fn feed_ordered(
    State(state): State<AppState>,
    Path((order, page)): Path<(String, String)>,
) -> Result<Json<Vec<EventView>>, ApiError> {
    list_feed(&state, FeedOrder::parse(&order), parse_page(&page)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_feed_orders() {
        assert_eq!(FeedOrder::parse("created"), FeedOrder::Created(Direction::Ascending));
        assert_eq!(FeedOrder::parse("-Created"), FeedOrder::Created(Direction::Descending));
        assert_eq!(FeedOrder::parse("END"), FeedOrder::End(Direction::Ascending));
        assert_eq!(FeedOrder::parse("-end"), FeedOrder::End(Direction::Descending));
        assert_eq!(FeedOrder::parse("name"), FeedOrder::default());
        assert_eq!(FeedOrder::parse("--end"), FeedOrder::default());
    }

    #[test]
    fn unparseable_pages_are_the_first() {
        assert_eq!(parse_page("3"), 3);
        assert_eq!(parse_page("-1"), 0);
        assert_eq!(parse_page("two"), 0);
    }
}
