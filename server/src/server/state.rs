//! Application state for the Eventgram HTTP server.
//!
//! Holds the injected adapters. Handlers build a fresh aggregate
//! environment per request from it; nothing else is shared between
//! requests.

use crate::aggregates::event::EventEnvironment;
use crate::aggregates::post::PostEnvironment;
use crate::aggregates::user::UserEnvironment;
use crate::auth::IdentityProvider;
use crate::config::Config;
use crate::images::{ImageTask, ResizeVariant, default_variants};
use crate::lifecycle::EventPolicy;
use eventgram_core::blob_store::BlobStore;
use eventgram_core::entity_store::EntityStore;
use eventgram_core::environment::Clock;
use eventgram_core::id::IdGenerator;
use eventgram_core::task_queue::TaskQueue;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply, via `Arc`) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<Config>,
    /// Clock for "now"
    pub clock: Arc<dyn Clock>,
    /// Event window policy derived from the configuration
    pub policy: EventPolicy,
    /// Record storage
    pub entities: Arc<dyn EntityStore>,
    /// Image storage
    pub blobs: Arc<dyn BlobStore>,
    /// Identifier source
    pub ids: Arc<dyn IdGenerator>,
    /// Image processing queue
    pub image_tasks: Arc<dyn TaskQueue<ImageTask>>,
    /// Bearer token resolution
    pub identity: Arc<dyn IdentityProvider>,
    /// Image variants produced for every upload
    pub variants: Vec<ResizeVariant>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// The event policy and the image variants are derived from `config`.
    #[must_use]
    pub fn new(
        config: Config,
        clock: Arc<dyn Clock>,
        entities: Arc<dyn EntityStore>,
        blobs: Arc<dyn BlobStore>,
        ids: Arc<dyn IdGenerator>,
        image_tasks: Arc<dyn TaskQueue<ImageTask>>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let policy = EventPolicy::from(&config.policy);
        let variants = default_variants(&config.images);
        Self {
            config: Arc::new(config),
            clock,
            policy,
            entities,
            blobs,
            ids,
            image_tasks,
            identity,
            variants,
        }
    }

    /// Environment of the event aggregate.
    #[must_use]
    pub fn event_env(&self) -> EventEnvironment {
        EventEnvironment::new(
            Arc::clone(&self.clock),
            self.policy,
            Arc::clone(&self.entities),
            Arc::clone(&self.blobs),
            Arc::clone(&self.ids),
            self.variants.clone(),
        )
    }

    /// Environment of the post aggregate.
    #[must_use]
    pub fn post_env(&self) -> PostEnvironment {
        PostEnvironment::new(
            Arc::clone(&self.clock),
            self.policy,
            Arc::clone(&self.entities),
            Arc::clone(&self.blobs),
            Arc::clone(&self.ids),
            Arc::clone(&self.image_tasks),
            self.variants.clone(),
        )
    }

    /// Environment of the user aggregate.
    #[must_use]
    pub fn user_env(&self) -> UserEnvironment {
        UserEnvironment::new(Arc::clone(&self.clock), Arc::clone(&self.entities))
    }
}
