//! Post aggregate.
//!
//! Posts are written only while their event is active and only by their
//! owner. The event reference is fixed at creation and an image can be
//! attached once; attaching hands the upload to the image worker.

use super::{Outcome, allocate_id, insert_failure};
use crate::auth::Actor;
use crate::error::ApiError;
use crate::images::{ImageTask, ResizeVariant, detect_content_type};
use crate::lifecycle::{self, EventPolicy, Ineligible};
use crate::storage::{discard_image, image_blob_name, repo};
use crate::types::{Event, Post, PostId, PostRequest};
use eventgram_core::blob_store::{Blob, BlobStore, BlobStoreError};
use eventgram_core::effect::Effect;
use eventgram_core::entity_store::{Entity, EntityStore};
use eventgram_core::environment::Clock;
use eventgram_core::id::IdGenerator;
use eventgram_core::reducer::Reducer;
use eventgram_core::task_queue::TaskQueue;
use eventgram_core::{SmallVec, smallvec};
use std::sync::Arc;

const NOT_OWNER: &str = "You can only update your own posts.";
const NO_OVERWRITE: &str = "Cannot overwrite the image in a post.";

// ============================================================================
// State
// ============================================================================

/// Request-scoped state of the post aggregate.
#[derive(Debug, Clone)]
pub struct PostState {
    /// Caller
    pub actor: Actor,
    /// The event the post references, as loaded by the shell
    pub event: Option<Event>,
    /// The stored post a command targets
    pub current: Option<Post>,
    /// Post being created, waiting for its identifier
    pub draft: Option<Post>,
    /// Settled result
    pub outcome: Outcome<Post>,
}

impl PostState {
    /// State for a command issued by `actor`.
    #[must_use]
    pub fn new(actor: Actor) -> Self {
        Self {
            actor,
            event: None,
            current: None,
            draft: None,
            outcome: Outcome::Pending,
        }
    }

    /// Adds the referenced event.
    #[must_use]
    pub fn with_event(mut self, event: Option<Event>) -> Self {
        self.event = event;
        self
    }

    /// Adds the stored post the command targets.
    #[must_use]
    pub fn with_current(mut self, post: Option<Post>) -> Self {
        self.current = post;
        self
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Commands from the shell and facts fed back by effects.
#[derive(Debug, Clone)]
pub enum PostAction {
    // Commands
    /// Create a post owned by the caller
    CreatePost {
        /// Client payload
        request: PostRequest,
    },

    /// Change the text of the loaded post
    UpdatePost {
        /// Target post
        post_id: PostId,
        /// Client payload
        request: PostRequest,
    },

    /// Store an image for the loaded post
    AttachImage {
        /// Target post
        post_id: PostId,
        /// Raw upload
        data: Vec<u8>,
    },

    /// Delete the loaded post and its image
    DeletePost {
        /// Target post
        post_id: PostId,
    },

    // Facts
    /// An unused identifier was reserved for the draft
    IdAllocated {
        /// The identifier
        id: String,
    },

    /// The draft was stored
    PostCreated {
        /// Stored post
        post: Post,
    },

    /// The update was stored
    PostUpdated {
        /// Stored post
        post: Post,
    },

    /// The upload was written to the blob store
    ImageStored {
        /// Blob name
        name: String,
        /// Public link of the blob
        link: String,
    },

    /// The post now references its image
    ImageAttached {
        /// Stored post
        post: Post,
    },

    /// The post was removed
    PostDeleted {
        /// Removed post
        post_id: PostId,
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

/// Collaborators of the post aggregate.
#[derive(Clone)]
pub struct PostEnvironment {
    /// Clock for "now"
    pub clock: Arc<dyn Clock>,
    /// Window limits
    pub policy: EventPolicy,
    /// Record storage
    pub entities: Arc<dyn EntityStore>,
    /// Image storage
    pub blobs: Arc<dyn BlobStore>,
    /// Identifier source
    pub ids: Arc<dyn IdGenerator>,
    /// Image processing queue
    pub image_tasks: Arc<dyn TaskQueue<ImageTask>>,
    /// Image variants to remove with a post
    pub variants: Vec<ResizeVariant>,
}

impl PostEnvironment {
    /// Creates a new `PostEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        policy: EventPolicy,
        entities: Arc<dyn EntityStore>,
        blobs: Arc<dyn BlobStore>,
        ids: Arc<dyn IdGenerator>,
        image_tasks: Arc<dyn TaskQueue<ImageTask>>,
        variants: Vec<ResizeVariant>,
    ) -> Self {
        Self {
            clock,
            policy,
            entities,
            blobs,
            ids,
            image_tasks,
            variants,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the post aggregate.
#[derive(Clone, Debug, Default)]
pub struct PostReducer;

impl PostReducer {
    /// Creates a new `PostReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn fail(state: &mut PostState, error: ApiError) -> SmallVec<[Effect<PostAction>; 4]> {
        match &error {
            ApiError::Forbidden(reason) => tracing::warn!(reason = %reason, "Post command forbidden"),
            ApiError::Internal { .. } => {},
            other => tracing::debug!(reason = %other, "Post command rejected"),
        }
        state.outcome = Outcome::Failed(error);
        SmallVec::new()
    }

    fn eligibility(ineligible: Ineligible) -> ApiError {
        match ineligible {
            Ineligible::NoSuchEvent => ApiError::validation(ineligible),
            Ineligible::Inactive => ApiError::forbidden(ineligible),
        }
    }

    /// The loaded post, if the caller owns it.
    fn owned_current(
        state: &PostState,
        post_id: &PostId,
        not_owner: &str,
    ) -> Result<Post, ApiError> {
        let user = state.actor.registered()?;
        let post = state
            .current
            .as_ref()
            .filter(|post| &post.id == post_id)
            .ok_or_else(|| ApiError::not_found("Post", post_id))?;
        if post.user != user.id {
            return Err(ApiError::forbidden(not_owner));
        }
        Ok(post.clone())
    }

    fn create(
        state: &mut PostState,
        request: PostRequest,
        env: &PostEnvironment,
    ) -> SmallVec<[Effect<PostAction>; 4]> {
        let user = match state.actor.registered() {
            Ok(user) => user.id.clone(),
            Err(error) => return Self::fail(state, error),
        };
        let Some(event_id) = request.event else {
            return Self::fail(state, ApiError::validation(lifecycle::PostRuleError::MissingEvent));
        };

        let now = env.clock.now();
        let event = state.event.as_ref().filter(|event| event.id == event_id);
        if let Err(ineligible) = lifecycle::check_post_eligibility(event, now, &env.policy) {
            return Self::fail(state, Self::eligibility(ineligible));
        }

        state.draft = Some(Post {
            user,
            id: PostId::default(),
            event: event_id,
            image: None,
            text: request.text,
            posted: now,
            modified: now,
        });

        smallvec![allocate_id(
            Arc::clone(&env.ids),
            Arc::clone(&env.entities),
            Post::KIND,
            |id| PostAction::IdAllocated { id },
            |error| PostAction::Failed { error },
        )]
    }

    fn store_draft(
        state: &mut PostState,
        id: String,
        env: &PostEnvironment,
    ) -> SmallVec<[Effect<PostAction>; 4]> {
        let Some(mut post) = state.draft.take() else {
            return SmallVec::new();
        };
        post.id = PostId::new(id);

        if let Err(reason) = lifecycle::check_post(&post) {
            return Self::fail(
                state,
                ApiError::internal("create_post", Some(post.id.as_str()), reason),
            );
        }

        let entities = Arc::clone(&env.entities);
        smallvec![Effect::future(async move {
            match repo::create(entities.as_ref(), &post).await {
                Ok(()) => Some(PostAction::PostCreated { post }),
                Err(error) => Some(PostAction::Failed {
                    error: insert_failure("create_post", Post::KIND, post.id.as_str(), &error),
                }),
            }
        })]
    }

    fn update(
        state: &mut PostState,
        post_id: &PostId,
        request: PostRequest,
        env: &PostEnvironment,
    ) -> SmallVec<[Effect<PostAction>; 4]> {
        let mut post = match Self::owned_current(state, post_id, NOT_OWNER) {
            Ok(post) => post,
            Err(error) => return Self::fail(state, error),
        };

        if request.event.as_ref().is_some_and(|event| event != &post.event) {
            return Self::fail(
                state,
                ApiError::validation("Cannot move this post to a different event."),
            );
        }

        let now = env.clock.now();
        let event = state.event.as_ref().filter(|event| event.id == post.event);
        if let Err(ineligible) = lifecycle::check_post_eligibility(event, now, &env.policy) {
            return Self::fail(state, Self::eligibility(ineligible));
        }

        post.text = request.text;
        post.modified = now;
        if let Err(reason) = lifecycle::check_post(&post) {
            return Self::fail(state, ApiError::validation(reason));
        }

        let entities = Arc::clone(&env.entities);
        smallvec![Effect::future(async move {
            match repo::save(entities.as_ref(), &post).await {
                Ok(()) => Some(PostAction::PostUpdated { post }),
                Err(error) => Some(PostAction::Failed {
                    error: ApiError::internal("update_post", Some(post.id.as_str()), error),
                }),
            }
        })]
    }

    fn attach(
        state: &mut PostState,
        post_id: &PostId,
        data: Vec<u8>,
        env: &PostEnvironment,
    ) -> SmallVec<[Effect<PostAction>; 4]> {
        let post = match Self::owned_current(state, post_id, "Cannot post for a different user.") {
            Ok(post) => post,
            Err(error) => return Self::fail(state, error),
        };
        if post.image.is_some() {
            return Self::fail(state, ApiError::forbidden(NO_OVERWRITE));
        }
        let Some(content_type) = detect_content_type(&data) else {
            return Self::fail(
                state,
                ApiError::validation("Unsupported image type; use PNG, JPEG or GIF."),
            );
        };

        let name = image_blob_name(&post.user, &post.id);
        let blobs = Arc::clone(&env.blobs);
        smallvec![Effect::future(async move {
            match blobs.create(name.clone(), Blob::new(content_type, data)).await {
                Ok(link) => Some(PostAction::ImageStored { name, link }),
                Err(BlobStoreError::AlreadyExists(_)) => Some(PostAction::Failed {
                    error: ApiError::forbidden(NO_OVERWRITE),
                }),
                Err(error) => Some(PostAction::Failed {
                    error: ApiError::internal("attach_image", Some(post.id.as_str()), error),
                }),
            }
        })]
    }

    fn link_image(
        state: &mut PostState,
        name: String,
        link: String,
        env: &PostEnvironment,
    ) -> SmallVec<[Effect<PostAction>; 4]> {
        let Some(mut post) = state.current.clone() else {
            return SmallVec::new();
        };
        post.image = Some(link);
        post.modified = env.clock.now();

        let entities = Arc::clone(&env.entities);
        let blobs = Arc::clone(&env.blobs);
        smallvec![Effect::future(async move {
            match repo::save(entities.as_ref(), &post).await {
                Ok(()) => Some(PostAction::ImageAttached { post }),
                Err(error) => {
                    // The upload is unreachable without the record.
                    discard_image(blobs.as_ref(), &name, &[]).await;
                    Some(PostAction::Failed {
                        error: ApiError::internal("attach_image", Some(post.id.as_str()), error),
                    })
                },
            }
        })]
    }

    fn enqueue_processing(post: &Post, env: &PostEnvironment) -> Effect<PostAction> {
        let task = ImageTask {
            filename: image_blob_name(&post.user, &post.id),
        };
        let queue = Arc::clone(&env.image_tasks);
        Effect::future(async move {
            match queue.enqueue(task.clone()).await {
                Ok(()) => {
                    metrics::counter!("eventgram_image_tasks_total", "outcome" => "enqueued")
                        .increment(1);
                },
                Err(error) => {
                    tracing::warn!(filename = %task.filename, error = %error, "Image task dropped");
                    metrics::counter!("eventgram_image_tasks_total", "outcome" => "dropped")
                        .increment(1);
                },
            }
            None
        })
    }

    fn delete(
        state: &mut PostState,
        post_id: &PostId,
        env: &PostEnvironment,
    ) -> SmallVec<[Effect<PostAction>; 4]> {
        let post = match Self::owned_current(state, post_id, NOT_OWNER) {
            Ok(post) => post,
            Err(error) => return Self::fail(state, error),
        };

        let entities = Arc::clone(&env.entities);
        let blobs = Arc::clone(&env.blobs);
        let variants = env.variants.clone();
        smallvec![Effect::future(async move {
            if let Err(error) = repo::remove::<Post>(entities.as_ref(), post.id.as_str()).await {
                return Some(PostAction::Failed {
                    error: ApiError::internal("delete_post", Some(post.id.as_str()), error),
                });
            }
            if post.image.is_some() {
                let name = image_blob_name(&post.user, &post.id);
                discard_image(blobs.as_ref(), &name, &variants).await;
            }
            Some(PostAction::PostDeleted { post_id: post.id })
        })]
    }
}

impl Reducer for PostReducer {
    type State = PostState;
    type Action = PostAction;
    type Environment = PostEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            PostAction::CreatePost { request } => Self::create(state, request, env),
            PostAction::UpdatePost { post_id, request } => {
                Self::update(state, &post_id, request, env)
            },
            PostAction::AttachImage { post_id, data } => Self::attach(state, &post_id, data, env),
            PostAction::DeletePost { post_id } => Self::delete(state, &post_id, env),
            PostAction::IdAllocated { id } => Self::store_draft(state, id, env),
            PostAction::PostCreated { post } => {
                tracing::info!(post_id = %post.id, event_id = %post.event, "Post created");
                state.outcome = Outcome::Done(post);
                SmallVec::new()
            },
            PostAction::PostUpdated { post } => {
                tracing::info!(post_id = %post.id, "Post updated");
                state.current = Some(post.clone());
                state.outcome = Outcome::Done(post);
                SmallVec::new()
            },
            PostAction::ImageStored { name, link } => Self::link_image(state, name, link, env),
            PostAction::ImageAttached { post } => {
                tracing::info!(post_id = %post.id, "Image attached");
                let effect = Self::enqueue_processing(&post, env);
                state.current = Some(post.clone());
                state.outcome = Outcome::Done(post);
                smallvec![effect]
            },
            PostAction::PostDeleted { post_id } => {
                tracing::info!(post_id = %post_id, "Post deleted");
                state.outcome = match state.current.take() {
                    Some(post) => Outcome::Done(post),
                    None => Outcome::Failed(ApiError::not_found("Post", post_id)),
                };
                SmallVec::new()
            },
            PostAction::Failed { error } => Self::fail(state, error),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::aggregates::dispatch;
    use crate::config::StorageConfig;
    use crate::images::resize::tests::png;
    use crate::storage::{InMemoryBlobStore, InMemoryEntityStore};
    use crate::types::{AppUser, EventId, UserId};
    use chrono::{DateTime, Duration, Utc};
    use eventgram_core::task_queue::QueueError;
    use eventgram_testing::{
        RecordingTaskQueue, ReducerTest, SequentialIdGenerator, assertions, test_clock,
    };

    fn now() -> DateTime<Utc> {
        test_clock().now()
    }

    fn user(id: &str) -> Actor {
        Actor::Registered(AppUser {
            id: UserId::new(id),
            username: id.to_string(),
            created: now(),
            modified: now(),
            ..AppUser::default()
        })
    }

    fn event(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
        Event {
            id: EventId::new(id),
            name: "Launch party".to_string(),
            description: "Rooftop".to_string(),
            start: Some(start),
            end: Some(end),
            creator: UserId::new("u9"),
            created: now() - Duration::days(1),
            modified: now() - Duration::days(1),
            ..Event::default()
        }
    }

    fn active() -> Event {
        event("e1", now() - Duration::hours(1), now() + Duration::hours(1))
    }

    fn post(id: &str, owner: &str) -> Post {
        Post {
            user: UserId::new(owner),
            id: PostId::new(id),
            event: EventId::new("e1"),
            image: None,
            text: "hello".to_string(),
            posted: now() - Duration::minutes(5),
            modified: now() - Duration::minutes(5),
        }
    }

    struct Harness {
        entities: InMemoryEntityStore,
        blobs: InMemoryBlobStore,
        tasks: RecordingTaskQueue<ImageTask>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                entities: InMemoryEntityStore::new(),
                blobs: InMemoryBlobStore::new(StorageConfig::default()),
                tasks: RecordingTaskQueue::new(),
            }
        }

        fn env(&self) -> PostEnvironment {
            self.env_with_queue(Arc::new(self.tasks.clone()))
        }

        fn env_with_queue(&self, queue: Arc<dyn TaskQueue<ImageTask>>) -> PostEnvironment {
            PostEnvironment::new(
                Arc::new(test_clock()),
                EventPolicy::default(),
                Arc::new(self.entities.clone()),
                Arc::new(self.blobs.clone()),
                Arc::new(SequentialIdGenerator::new("p")),
                queue,
                vec![ResizeVariant::thumbnail(100)],
            )
        }
    }

    fn create(event_id: Option<&str>) -> PostAction {
        PostAction::CreatePost {
            request: PostRequest {
                event: event_id.map(EventId::new),
                text: "first!".to_string(),
            },
        }
    }

    #[test]
    fn create_requires_an_event_reference() {
        ReducerTest::new(PostReducer::new())
            .with_env(Harness::new().env())
            .given_state(PostState::new(user("u1")))
            .when_action(create(None))
            .then_state(|state| {
                assert!(matches!(state.outcome, Outcome::Failed(ApiError::ValidationFailed(_))));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn create_against_missing_event_is_a_bad_request() {
        ReducerTest::new(PostReducer::new())
            .with_env(Harness::new().env())
            .given_state(PostState::new(user("u1")))
            .when_action(create(Some("e404")))
            .then_state(|state| {
                assert_eq!(
                    state.outcome,
                    Outcome::Failed(ApiError::validation("Post does not match an existing event."))
                );
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn create_against_inactive_event_is_forbidden() {
        let ended = event("e1", now() - Duration::hours(3), now() - Duration::hours(1));

        ReducerTest::new(PostReducer::new())
            .with_env(Harness::new().env())
            .given_state(PostState::new(user("u1")).with_event(Some(ended)))
            .when_action(create(Some("e1")))
            .then_state(|state| {
                assert_eq!(
                    state.outcome,
                    Outcome::Failed(ApiError::forbidden("This event is not currently active."))
                );
                assert!(state.draft.is_none());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn unregistered_callers_cannot_post() {
        ReducerTest::new(PostReducer::new())
            .with_env(Harness::new().env())
            .given_state(PostState::new(Actor::Anonymous).with_event(Some(active())))
            .when_action(create(Some("e1")))
            .then_state(|state| {
                assert_eq!(state.outcome, Outcome::Failed(ApiError::NotSignedIn));
            })
            .run();
    }

    #[tokio::test]
    async fn create_stores_the_post() {
        let harness = Harness::new();
        let settled = dispatch(
            PostReducer::new(),
            PostState::new(user("u1")).with_event(Some(active())),
            harness.env(),
            create(Some("e1")),
        )
        .await
        .unwrap();

        let created = settled.outcome.into_result("create_post").unwrap();
        assert_eq!(created.id, PostId::new("p1"));
        assert_eq!(created.user, UserId::new("u1"));
        assert_eq!(created.posted, now());
        assert_eq!(
            repo::fetch::<Post>(&harness.entities, "p1").await.unwrap(),
            Some(created)
        );
    }

    #[test]
    fn update_cannot_move_a_post() {
        ReducerTest::new(PostReducer::new())
            .with_env(Harness::new().env())
            .given_state(
                PostState::new(user("u1"))
                    .with_event(Some(active()))
                    .with_current(Some(post("p1", "u1"))),
            )
            .when_action(PostAction::UpdatePost {
                post_id: PostId::new("p1"),
                request: PostRequest {
                    event: Some(EventId::new("e2")),
                    text: "moved".to_string(),
                },
            })
            .then_state(|state| {
                assert_eq!(
                    state.outcome,
                    Outcome::Failed(ApiError::validation(
                        "Cannot move this post to a different event."
                    ))
                );
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn update_by_another_user_is_forbidden() {
        ReducerTest::new(PostReducer::new())
            .with_env(Harness::new().env())
            .given_state(
                PostState::new(user("u2"))
                    .with_event(Some(active()))
                    .with_current(Some(post("p1", "u1"))),
            )
            .when_action(PostAction::UpdatePost {
                post_id: PostId::new("p1"),
                request: PostRequest::default(),
            })
            .then_state(|state| {
                assert_eq!(state.outcome, Outcome::Failed(ApiError::forbidden(NOT_OWNER)));
            })
            .run();
    }

    #[tokio::test]
    async fn update_rewrites_text() {
        let harness = Harness::new();
        repo::save(&harness.entities, &post("p1", "u1")).await.unwrap();

        let settled = dispatch(
            PostReducer::new(),
            PostState::new(user("u1"))
                .with_event(Some(active()))
                .with_current(Some(post("p1", "u1"))),
            harness.env(),
            PostAction::UpdatePost {
                post_id: PostId::new("p1"),
                request: PostRequest {
                    event: Some(EventId::new("e1")),
                    text: "edited".to_string(),
                },
            },
        )
        .await
        .unwrap();

        let updated = settled.outcome.into_result("update_post").unwrap();
        assert_eq!(updated.text, "edited");
        assert_eq!(updated.modified, now());
    }

    #[tokio::test]
    async fn attach_stores_blob_and_enqueues_processing() {
        let harness = Harness::new();
        repo::save(&harness.entities, &post("p1", "u1")).await.unwrap();

        let settled = dispatch(
            PostReducer::new(),
            PostState::new(user("u1")).with_current(Some(post("p1", "u1"))),
            harness.env(),
            PostAction::AttachImage {
                post_id: PostId::new("p1"),
                data: png(4, 4),
            },
        )
        .await
        .unwrap();

        let attached = settled.outcome.into_result("attach_image").unwrap();
        assert_eq!(attached.image, Some(harness.blobs.link("u1/p1")));
        assert_eq!(harness.blobs.names(), ["u1/p1"]);
        assert_eq!(
            harness.tasks.tasks(),
            [ImageTask {
                filename: "u1/p1".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn attach_succeeds_when_the_queue_is_full() {
        let harness = Harness::new();
        repo::save(&harness.entities, &post("p1", "u1")).await.unwrap();

        let settled = dispatch(
            PostReducer::new(),
            PostState::new(user("u1")).with_current(Some(post("p1", "u1"))),
            harness.env_with_queue(Arc::new(RecordingTaskQueue::failing(QueueError::Full))),
            PostAction::AttachImage {
                post_id: PostId::new("p1"),
                data: png(4, 4),
            },
        )
        .await
        .unwrap();

        assert!(matches!(settled.outcome, Outcome::Done(_)));
    }

    #[test]
    fn attach_never_overwrites() {
        let mut existing = post("p1", "u1");
        existing.image = Some("https://cdn.example.com/u1/p1".to_string());

        ReducerTest::new(PostReducer::new())
            .with_env(Harness::new().env())
            .given_state(PostState::new(user("u1")).with_current(Some(existing)))
            .when_action(PostAction::AttachImage {
                post_id: PostId::new("p1"),
                data: png(4, 4),
            })
            .then_state(|state| {
                assert_eq!(
                    state.outcome,
                    Outcome::Failed(ApiError::forbidden("Cannot overwrite the image in a post."))
                );
                let kept = state.current.as_ref().unwrap();
                assert_eq!(kept.image.as_deref(), Some("https://cdn.example.com/u1/p1"));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[tokio::test]
    async fn racing_attach_keeps_the_first_upload() {
        let harness = Harness::new();
        repo::save(&harness.entities, &post("p1", "u1")).await.unwrap();
        // A concurrent attach stored its upload but has not linked it yet.
        harness
            .blobs
            .create("u1/p1".to_string(), Blob::new("image/gif", vec![7, 7]))
            .await
            .unwrap();

        let settled = dispatch(
            PostReducer::new(),
            PostState::new(user("u1")).with_current(Some(post("p1", "u1"))),
            harness.env(),
            PostAction::AttachImage {
                post_id: PostId::new("p1"),
                data: png(4, 4),
            },
        )
        .await
        .unwrap();

        assert_eq!(
            settled.outcome,
            Outcome::Failed(ApiError::forbidden("Cannot overwrite the image in a post."))
        );
        let kept = harness.blobs.get("u1/p1".to_string()).await.unwrap();
        assert_eq!(kept.data, vec![7, 7]);
        let stored = repo::fetch::<Post>(&harness.entities, "p1").await.unwrap().unwrap();
        assert_eq!(stored.image, None);
        assert!(harness.tasks.tasks().is_empty());
    }

    #[test]
    fn attach_rejects_other_users_and_non_images() {
        ReducerTest::new(PostReducer::new())
            .with_env(Harness::new().env())
            .given_state(PostState::new(user("u2")).with_current(Some(post("p1", "u1"))))
            .when_action(PostAction::AttachImage {
                post_id: PostId::new("p1"),
                data: png(4, 4),
            })
            .then_state(|state| {
                assert_eq!(
                    state.outcome,
                    Outcome::Failed(ApiError::forbidden("Cannot post for a different user."))
                );
            })
            .run();

        ReducerTest::new(PostReducer::new())
            .with_env(Harness::new().env())
            .given_state(PostState::new(user("u1")).with_current(Some(post("p1", "u1"))))
            .when_action(PostAction::AttachImage {
                post_id: PostId::new("p1"),
                data: b"not an image".to_vec(),
            })
            .then_state(|state| {
                assert!(matches!(state.outcome, Outcome::Failed(ApiError::ValidationFailed(_))));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[tokio::test]
    async fn delete_removes_record_and_blobs() {
        let harness = Harness::new();
        let mut stored = post("p1", "u1");
        stored.image = Some(harness.blobs.link("u1/p1"));
        repo::save(&harness.entities, &stored).await.unwrap();
        for name in ["u1/p1", "u1/p1_thumb"] {
            harness
                .blobs
                .put(name.to_string(), Blob::new("image/png", png(2, 2)))
                .await
                .unwrap();
        }

        let settled = dispatch(
            PostReducer::new(),
            PostState::new(user("u1")).with_current(Some(stored)),
            harness.env(),
            PostAction::DeletePost {
                post_id: PostId::new("p1"),
            },
        )
        .await
        .unwrap();

        assert!(matches!(settled.outcome, Outcome::Done(_)));
        assert_eq!(harness.entities.count(Post::KIND), 0);
        assert!(harness.blobs.names().is_empty());
    }
}
