//! Aggregates: the pure decision logic behind every write.
//!
//! Each aggregate is a [`Reducer`] over a request-scoped state holding the
//! resolved [`Actor`](crate::auth::Actor), the records the handler loaded and
//! an [`Outcome`]. Commands come from the HTTP shell; the effects they return
//! feed facts back until the outcome settles.

pub mod event;
pub mod post;
pub mod user;

use crate::error::ApiError;
use eventgram_core::effect::Effect;
use eventgram_core::entity_store::{EntityKey, EntityStore, EntityStoreError};
use eventgram_core::id::IdGenerator;
use eventgram_core::reducer::Reducer;
use eventgram_runtime::Store;
use std::sync::Arc;

/// Result of a command once the store is quiescent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// No decision recorded yet
    Pending,
    /// Command succeeded
    Done(T),
    /// Command was rejected or failed
    Failed(ApiError),
}

impl<T> Default for Outcome<T> {
    fn default() -> Self {
        Self::Pending
    }
}

impl<T> Outcome<T> {
    /// Converts a settled outcome into a result.
    ///
    /// # Errors
    ///
    /// The recorded failure, or an internal error if nothing was recorded.
    pub fn into_result(self, operation: &'static str) -> Result<T, ApiError> {
        match self {
            Self::Done(value) => Ok(value),
            Self::Failed(error) => Err(error),
            Self::Pending => Err(ApiError::internal(
                operation,
                None,
                "command settled without an outcome",
            )),
        }
    }

    /// True until a decision is recorded.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Runs `action` through a fresh store and returns the settled state.
///
/// # Errors
///
/// An internal error if the feedback loop exceeds its limit.
pub async fn dispatch<R>(
    reducer: R,
    state: R::State,
    environment: R::Environment,
    action: R::Action,
) -> Result<R::State, ApiError>
where
    R: Reducer + Send + Sync,
    R::State: Send + Sync,
    R::Action: Send + 'static,
    R::Environment: Send + Sync,
{
    let store = Store::new(state, reducer, environment);
    store
        .send(action)
        .await
        .map_err(|e| ApiError::internal("dispatch", None, e))?;
    Ok(store.into_state())
}

/// Effect that generates an identifier and checks it is unused.
///
/// A collision is an anomaly in the generator: it is logged, counted and
/// fails the command so the caller can retry.
pub fn allocate_id<A, F, G>(
    ids: Arc<dyn IdGenerator>,
    entities: Arc<dyn EntityStore>,
    kind: &'static str,
    on_allocated: F,
    on_failed: G,
) -> Effect<A>
where
    A: Send + 'static,
    F: FnOnce(String) -> A + Send + 'static,
    G: FnOnce(ApiError) -> A + Send + 'static,
{
    Effect::future(async move {
        let id = match ids.next_id() {
            Ok(id) => id,
            Err(error) => return Some(on_failed(ApiError::internal("allocate_id", None, error))),
        };

        match entities.get(EntityKey::new(kind, id.clone())).await {
            Err(EntityStoreError::NotFound(_)) => Some(on_allocated(id)),
            Ok(_) => {
                record_collision(kind, &id);
                Some(on_failed(ApiError::internal(
                    "allocate_id",
                    Some(id.as_str()),
                    "generated identifier already exists",
                )))
            },
            Err(error) => Some(on_failed(ApiError::internal("allocate_id", Some(id.as_str()), error))),
        }
    })
}

/// Maps a failed conditional insert, counting lost races as collisions.
pub(crate) fn insert_failure(
    operation: &'static str,
    kind: &'static str,
    id: &str,
    error: &EntityStoreError,
) -> ApiError {
    if matches!(error, EntityStoreError::AlreadyExists(_)) {
        record_collision(kind, id);
    }
    ApiError::internal(operation, Some(id), error)
}

fn record_collision(kind: &'static str, id: &str) {
    tracing::warn!(kind, id, "Identifier collision detected");
    metrics::counter!("eventgram_id_collisions_total", "kind" => kind).increment(1);
}
