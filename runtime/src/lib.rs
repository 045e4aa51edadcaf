//! # Eventgram Runtime
//!
//! Runtime implementation for the Eventgram reducer architecture.
//!
//! This crate provides the `Store` that coordinates reducer execution and
//! effect handling.
//!
//! ## Core Components
//!
//! - **Store**: owns the state of one decision and executes its effects
//! - **Effect Executor**: runs effect descriptions and collects the actions they produce
//! - **Event Loop**: action → reducer → effects → action, until nothing is left to do
//!
//! A store is request-scoped: the HTTP shell builds one per request from the
//! records it loaded, sends a single command and reads the settled state.
//! Nothing is shared between requests except the injected environment.
//!
//! ## Example
//!
//! ```ignore
//! use eventgram_runtime::Store;
//!
//! let store = Store::new(initial_state, EventReducer, environment);
//!
//! // Send an action and run every effect it triggers
//! store.send(EventAction::CreateEvent { request }).await?;
//!
//! // Read the settled state
//! let outcome = store.into_state().outcome;
//! ```

use eventgram_core::{effect::Effect, reducer::Reducer};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Bound on the number of actions a single `send` may process.
pub const FEEDBACK_LIMIT: usize = 64;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Effects kept feeding actions back past the configured limit.
        ///
        /// This indicates a reducer loop rather than a slow effect.
        #[error("Feedback limit of {0} actions exceeded")]
        FeedbackLimitExceeded(usize),
    }
}

pub use error::StoreError;

/// Store module - the runtime for reducers
pub mod store {
    use super::{FEEDBACK_LIMIT, Effect, Reducer, RwLock, StoreError, VecDeque};

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store:
    /// 1. Holds the current state (behind an async `RwLock`)
    /// 2. Processes actions through the reducer
    /// 3. Executes effects and feeds the actions they produce back in
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer type
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = Store::new(PostState::for_actor(actor), PostReducer, env);
    /// let processed = store.send(PostAction::DeletePost { post_id }).await?;
    /// ```
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: RwLock<S>,
        reducer: R,
        environment: E,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync,
        A: Send + 'static,
        S: Send + Sync,
        E: Send + Sync,
    {
        /// Create a new store with initial state, reducer, and environment
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self {
                state: RwLock::new(initial_state),
                reducer,
                environment,
            }
        }

        /// Send an action to the store
        ///
        /// Runs the reducer, executes the returned effects, and repeats for
        /// every action those effects produce. Returns once the store is
        /// quiescent, with the number of actions processed (including the
        /// initial one).
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::FeedbackLimitExceeded`] if more than
        /// [`FEEDBACK_LIMIT`] actions were processed.
        #[allow(clippy::cast_precision_loss)] // Action counts stay far below 2^52
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<usize, StoreError> {
            let mut queue = VecDeque::from([action]);
            let mut processed = 0;

            while let Some(action) = queue.pop_front() {
                processed += 1;
                if processed > FEEDBACK_LIMIT {
                    tracing::error!(limit = FEEDBACK_LIMIT, "Store feedback limit exceeded");
                    return Err(StoreError::FeedbackLimitExceeded(FEEDBACK_LIMIT));
                }

                let effects = {
                    let mut state = self.state.write().await;
                    self.reducer.reduce(&mut state, action, &self.environment)
                };

                for effect in effects {
                    queue.extend(execute(effect).await);
                }
            }

            metrics::histogram!("store.actions.per_send").record(processed as f64);
            Ok(processed)
        }

        /// Consume the store and return its final state
        #[must_use]
        pub fn into_state(self) -> S {
            self.state.into_inner()
        }
    }

    /// Execute one effect and return the action it produces, if any
    async fn execute<A>(effect: Effect<A>) -> Option<A> {
        match effect {
            Effect::None => {
                tracing::trace!("Executing Effect::None (no-op)");
                None
            },
            Effect::Future(fut) => {
                tracing::trace!("Executing Effect::Future");
                metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                fut.await
            },
        }
    }
}

pub use store::Store;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use eventgram_core::{SmallVec, smallvec};

    #[derive(Debug, Clone, Default)]
    struct TestState {
        value: i32,
        log: Vec<&'static str>,
    }

    #[derive(Debug, Clone)]
    enum TestAction {
        Increment,
        Decrement,
        ProduceIncrement,
        ProduceTwo,
        ProduceNothing,
        Loop,
        Tag(&'static str),
    }

    #[derive(Clone)]
    struct TestReducer;

    struct TestEnv;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.value += 1;
                    SmallVec::new()
                },
                TestAction::Decrement => {
                    state.value -= 1;
                    SmallVec::new()
                },
                TestAction::ProduceIncrement => {
                    smallvec![Effect::future(async { Some(TestAction::Increment) })]
                },
                TestAction::ProduceTwo => smallvec![
                    Effect::future(async { Some(TestAction::Tag("first")) }),
                    Effect::None,
                    Effect::future(async { Some(TestAction::Tag("second")) }),
                ],
                TestAction::ProduceNothing => smallvec![Effect::future(async { None })],
                TestAction::Loop => smallvec![Effect::future(async { Some(TestAction::Loop) })],
                TestAction::Tag(tag) => {
                    state.log.push(tag);
                    smallvec![Effect::None]
                },
            }
        }
    }

    fn store() -> Store<TestState, TestAction, TestEnv, TestReducer> {
        Store::new(TestState::default(), TestReducer, TestEnv)
    }

    #[tokio::test]
    async fn send_updates_state() {
        let store = store();
        store.send(TestAction::Increment).await.unwrap();
        store.send(TestAction::Increment).await.unwrap();
        store.send(TestAction::Decrement).await.unwrap();

        assert_eq!(store.into_state().value, 1);
    }

    #[test]
    fn future_effect_feeds_action_back() {
        let store = store();
        let processed = tokio_test::block_on(store.send(TestAction::ProduceIncrement)).unwrap();

        assert_eq!(processed, 2);
        assert_eq!(store.into_state().value, 1);
    }

    #[tokio::test]
    async fn effects_run_and_feed_back_in_order() {
        let store = store();
        let processed = store.send(TestAction::ProduceTwo).await.unwrap();

        assert_eq!(processed, 3);
        assert_eq!(store.into_state().log, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn future_without_action_ends_the_loop() {
        let store = store();
        assert_eq!(store.send(TestAction::ProduceNothing).await, Ok(1));
    }

    #[tokio::test]
    async fn runaway_feedback_is_cut_off() {
        let store = store();
        let result = store.send(TestAction::Loop).await;

        assert_eq!(result, Err(StoreError::FeedbackLimitExceeded(FEEDBACK_LIMIT)));
    }
}
