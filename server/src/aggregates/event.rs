//! Event aggregate.
//!
//! Creates, updates and deletes events. Only registered users create events
//! and only the creator may change or delete one. Deleting an event deletes
//! every post that references it.

use super::{Outcome, allocate_id, insert_failure};
use crate::auth::Actor;
use crate::error::ApiError;
use crate::images::ResizeVariant;
use crate::lifecycle::{self, EventPolicy};
use crate::storage::{discard_image, image_blob_name, repo};
use crate::types::{Event, EventId, EventRequest, Post};
use eventgram_core::blob_store::BlobStore;
use eventgram_core::effect::Effect;
use eventgram_core::entity_store::{Entity, EntityStore, EntityStoreError, Query};
use eventgram_core::environment::Clock;
use eventgram_core::id::IdGenerator;
use eventgram_core::reducer::Reducer;
use eventgram_core::{SmallVec, smallvec};
use std::sync::Arc;

const NOT_CREATOR: &str = "You can only modify events you created.";

// ============================================================================
// State
// ============================================================================

/// Request-scoped state of the event aggregate.
#[derive(Debug, Clone)]
pub struct EventState {
    /// Caller
    pub actor: Actor,
    /// The stored event a command targets, as loaded by the shell
    pub current: Option<Event>,
    /// Event being created, waiting for its identifier
    pub draft: Option<Event>,
    /// Posts removed by a delete cascade
    pub posts_deleted: usize,
    /// Settled result
    pub outcome: Outcome<Event>,
}

impl EventState {
    /// State for a command issued by `actor`.
    #[must_use]
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            current: None,
            draft: None,
            posts_deleted: 0,
            outcome: Outcome::Pending,
        }
    }

    /// Adds the stored event the command targets.
    #[must_use]
    pub fn with_current(mut self, event: Option<Event>) -> Self {
        self.current = event;
        self
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Commands from the shell and facts fed back by effects.
#[derive(Debug, Clone)]
pub enum EventAction {
    // Commands
    /// Create an event owned by the caller
    CreateEvent {
        /// Client payload
        request: EventRequest,
    },

    /// Update the loaded event
    UpdateEvent {
        /// Target event
        event_id: EventId,
        /// Client payload
        request: EventRequest,
    },

    /// Delete the loaded event and its posts
    DeleteEvent {
        /// Target event
        event_id: EventId,
    },

    // Facts
    /// An unused identifier was reserved for the draft
    IdAllocated {
        /// The identifier
        id: String,
    },

    /// The draft was stored
    EventCreated {
        /// Stored event
        event: Event,
    },

    /// The update was stored
    EventUpdated {
        /// Stored event
        event: Event,
    },

    /// The event and its posts were removed
    EventDeleted {
        /// Removed event
        event_id: EventId,
        /// Number of posts removed with it
        posts_deleted: usize,
    },

    /// An effect failed
    Failed {
        /// What went wrong
        error: ApiError,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Collaborators of the event aggregate.
#[derive(Clone)]
pub struct EventEnvironment {
    /// Clock for "now"
    pub clock: Arc<dyn Clock>,
    /// Window limits
    pub policy: EventPolicy,
    /// Record storage
    pub entities: Arc<dyn EntityStore>,
    /// Image storage (for the delete cascade)
    pub blobs: Arc<dyn BlobStore>,
    /// Identifier source
    pub ids: Arc<dyn IdGenerator>,
    /// Image variants to remove with their posts
    pub variants: Vec<ResizeVariant>,
}

impl EventEnvironment {
    /// Creates a new `EventEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        policy: EventPolicy,
        entities: Arc<dyn EntityStore>,
        blobs: Arc<dyn BlobStore>,
        ids: Arc<dyn IdGenerator>,
        variants: Vec<ResizeVariant>,
    ) -> Self {
        Self {
            clock,
            policy,
            entities,
            blobs,
            ids,
            variants,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the event aggregate.
#[derive(Clone, Debug, Default)]
pub struct EventReducer;

impl EventReducer {
    /// Creates a new `EventReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn fail(state: &mut EventState, error: ApiError) -> SmallVec<[Effect<EventAction>; 4]> {
        match &error {
            ApiError::Forbidden(reason) => tracing::warn!(reason = %reason, "Event command forbidden"),
            ApiError::Internal { .. } => {},
            other => tracing::debug!(reason = %other, "Event command rejected"),
        }
        state.outcome = Outcome::Failed(error);
        SmallVec::new()
    }

    fn owned_current<'a>(state: &'a EventState, event_id: &EventId) -> Result<&'a Event, ApiError> {
        let user = state.actor.registered()?;
        let event = state
            .current
            .as_ref()
            .filter(|event| &event.id == event_id)
            .ok_or_else(|| ApiError::not_found("Event", event_id))?;
        if event.creator != user.id {
            return Err(ApiError::forbidden(NOT_CREATOR));
        }
        Ok(event)
    }

    fn create(
        state: &mut EventState,
        request: EventRequest,
        env: &EventEnvironment,
    ) -> SmallVec<[Effect<EventAction>; 4]> {
        let creator = match state.actor.registered() {
            Ok(user) => user.id.clone(),
            Err(error) => return Self::fail(state, error),
        };

        let now = env.clock.now();
        if let Err(reason) = lifecycle::check_request(&request, now, &env.policy) {
            return Self::fail(state, ApiError::validation(reason));
        }

        state.draft = Some(Event {
            id: EventId::default(),
            name: request.name,
            description: request.description,
            start: lifecycle::clamp_start(request.start, now),
            end: request.end,
            private: request.private,
            creator,
            created: now,
            modified: now,
        });

        smallvec![allocate_id(
            Arc::clone(&env.ids),
            Arc::clone(&env.entities),
            Event::KIND,
            |id| EventAction::IdAllocated { id },
            |error| EventAction::Failed { error },
        )]
    }

    fn store_draft(
        state: &mut EventState,
        id: String,
        env: &EventEnvironment,
    ) -> SmallVec<[Effect<EventAction>; 4]> {
        let Some(mut event) = state.draft.take() else {
            return SmallVec::new();
        };
        event.id = EventId::new(id);

        if let Err(reason) = lifecycle::check_record(&event, env.clock.now(), &env.policy) {
            return Self::fail(
                state,
                ApiError::internal("create_event", Some(event.id.as_str()), reason),
            );
        }

        let entities = Arc::clone(&env.entities);
        smallvec![Effect::future(async move {
            match repo::create(entities.as_ref(), &event).await {
                Ok(()) => Some(EventAction::EventCreated { event }),
                Err(error) => Some(EventAction::Failed {
                    error: insert_failure("create_event", Event::KIND, event.id.as_str(), &error),
                }),
            }
        })]
    }

    fn update(
        state: &mut EventState,
        event_id: &EventId,
        request: EventRequest,
        env: &EventEnvironment,
    ) -> SmallVec<[Effect<EventAction>; 4]> {
        let current = match Self::owned_current(state, event_id) {
            Ok(event) => event.clone(),
            Err(error) => return Self::fail(state, error),
        };

        let now = env.clock.now();
        if !env.policy.allow_extending_expired && current.end.is_some_and(|end| end < now) {
            return Self::fail(state, ApiError::forbidden("This event has already ended."));
        }
        if let Err(reason) = lifecycle::check_request(&request, now, &env.policy) {
            return Self::fail(state, ApiError::validation(reason));
        }

        let mut updated = current.clone();
        updated.name = request.name;
        updated.description = request.description;
        updated.private = request.private;
        updated.end = request.end;
        // The start is fixed once the event has begun.
        if current.start.is_some_and(|start| start > now) {
            updated.start = lifecycle::clamp_start(request.start, now);
        }
        updated.modified = now;

        if let Err(reason) = lifecycle::check_record(&updated, now, &env.policy) {
            return Self::fail(state, ApiError::validation(reason));
        }

        let entities = Arc::clone(&env.entities);
        smallvec![Effect::future(async move {
            match repo::save(entities.as_ref(), &updated).await {
                Ok(()) => Some(EventAction::EventUpdated { event: updated }),
                Err(error) => Some(EventAction::Failed {
                    error: ApiError::internal("update_event", Some(updated.id.as_str()), error),
                }),
            }
        })]
    }

    fn delete(
        state: &mut EventState,
        event_id: &EventId,
        env: &EventEnvironment,
    ) -> SmallVec<[Effect<EventAction>; 4]> {
        if let Err(error) = Self::owned_current(state, event_id) {
            return Self::fail(state, error);
        }

        let event_id = event_id.clone();
        let entities = Arc::clone(&env.entities);
        let blobs = Arc::clone(&env.blobs);
        let variants = env.variants.clone();

        smallvec![Effect::future(async move {
            let failed = |error: EntityStoreError| EventAction::Failed {
                error: ApiError::internal("delete_event", Some(event_id.as_str()), error),
            };

            let posts: Vec<Post> = match repo::find(
                entities.as_ref(),
                Query::new(Post::KIND).filter("event", event_id.as_str()),
            )
            .await
            {
                Ok(posts) => posts,
                Err(error) => return Some(failed(error)),
            };

            let mut posts_deleted = 0;
            for post in posts {
                match repo::remove::<Post>(entities.as_ref(), post.id.as_str()).await {
                    Ok(removed) => {
                        posts_deleted += usize::from(removed);
                        if post.image.is_some() {
                            let name = image_blob_name(&post.user, &post.id);
                            discard_image(blobs.as_ref(), &name, &variants).await;
                        }
                    },
                    Err(error) => return Some(failed(error)),
                }
            }

            if let Err(error) = repo::remove::<Event>(entities.as_ref(), event_id.as_str()).await {
                return Some(failed(error));
            }
            Some(EventAction::EventDeleted {
                event_id: event_id.clone(),
                posts_deleted,
            })
        })]
    }
}

impl Reducer for EventReducer {
    type State = EventState;
    type Action = EventAction;
    type Environment = EventEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            EventAction::CreateEvent { request } => Self::create(state, request, env),
            EventAction::UpdateEvent { event_id, request } => {
                Self::update(state, &event_id, request, env)
            },
            EventAction::DeleteEvent { event_id } => Self::delete(state, &event_id, env),
            EventAction::IdAllocated { id } => Self::store_draft(state, id, env),
            EventAction::EventCreated { event } => {
                tracing::info!(event_id = %event.id, user_id = %event.creator, "Event created");
                state.outcome = Outcome::Done(event);
                SmallVec::new()
            },
            EventAction::EventUpdated { event } => {
                tracing::info!(event_id = %event.id, "Event updated");
                state.current = Some(event.clone());
                state.outcome = Outcome::Done(event);
                SmallVec::new()
            },
            EventAction::EventDeleted {
                event_id,
                posts_deleted,
            } => {
                tracing::info!(event_id = %event_id, posts_deleted, "Event deleted");
                state.posts_deleted = posts_deleted;
                state.outcome = match state.current.take() {
                    Some(event) => Outcome::Done(event),
                    None => Outcome::Failed(ApiError::not_found("Event", event_id)),
                };
                SmallVec::new()
            },
            EventAction::Failed { error } => Self::fail(state, error),
        }
    }
}
