//! # Eventgram Testing
//!
//! Testing utilities and helpers for Eventgram.
//!
//! This crate provides:
//! - Mock implementations of Environment traits
//! - A Given-When-Then harness for reducers
//! - Property-based testing strategies
//! - Assertion helpers for effects
//!
//! ## Example
//!
//! ```ignore
//! use eventgram_testing::{ReducerTest, test_clock};
//!
//! #[test]
//! fn test_create_event() {
//!     ReducerTest::new(EventReducer)
//!         .with_env(test_environment(test_clock()))
//!         .given_state(EventState::for_actor(registered_user()))
//!         .when_action(EventAction::CreateEvent { request })
//!         .then_effects(|effects| assertions::assert_has_future_effect(effects))
//!         .run();
//! }
//! ```

use chrono::{DateTime, Utc};
use eventgram_core::environment::Clock;

pub mod reducer_test;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use eventgram_core::id::{IdError, IdGenerator, RandomSource};
    use eventgram_core::task_queue::{QueueError, TaskQueue};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use eventgram_testing::mocks::FixedClock;
    /// use eventgram_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable identifiers: `<prefix>1`, `<prefix>2`, ...
    #[derive(Debug)]
    pub struct SequentialIdGenerator {
        prefix: String,
        next: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Create a generator whose identifiers start with `prefix`
        #[must_use]
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                next: AtomicU64::new(1),
            }
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> Result<String, IdError> {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{}{n}", self.prefix))
        }
    }

    /// Random source that always yields the same suffix
    #[derive(Debug, Clone, Copy)]
    pub struct FixedRandom(pub u16);

    impl RandomSource for FixedRandom {
        fn next_u16(&self) -> Result<u16, IdError> {
            Ok(self.0)
        }
    }

    /// Random source that is never available
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UnavailableRandom;

    impl RandomSource for UnavailableRandom {
        fn next_u16(&self) -> Result<u16, IdError> {
            Err(IdError::RandomSourceUnavailable(
                "random source disabled for test".to_string(),
            ))
        }
    }

    /// Task queue that records every accepted task
    ///
    /// Clones share the same recording, so a test can keep one handle and
    /// give another to the environment under test.
    #[derive(Debug)]
    pub struct RecordingTaskQueue<T> {
        tasks: Arc<Mutex<Vec<T>>>,
        failure: Option<QueueError>,
    }

    impl<T> RecordingTaskQueue<T> {
        /// Create a queue that accepts every task
        #[must_use]
        pub fn new() -> Self {
            Self {
                tasks: Arc::new(Mutex::new(Vec::new())),
                failure: None,
            }
        }

        /// Create a queue that rejects every task with `error`
        #[must_use]
        pub fn failing(error: QueueError) -> Self {
            Self {
                tasks: Arc::new(Mutex::new(Vec::new())),
                failure: Some(error),
            }
        }

        /// Tasks accepted so far
        #[must_use]
        pub fn tasks(&self) -> Vec<T>
        where
            T: Clone,
        {
            self.tasks.lock().map(|tasks| tasks.clone()).unwrap_or_default()
        }
    }

    impl<T> Default for RecordingTaskQueue<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<T> Clone for RecordingTaskQueue<T> {
        fn clone(&self) -> Self {
            Self {
                tasks: Arc::clone(&self.tasks),
                failure: self.failure.clone(),
            }
        }
    }

    impl<T: Send + 'static> TaskQueue<T> for RecordingTaskQueue<T> {
        fn enqueue(
            &self,
            task: T,
        ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
            let result = match &self.failure {
                Some(error) => Err(error.clone()),
                None => self
                    .tasks
                    .lock()
                    .map(|mut tasks| tasks.push(task))
                    .map_err(|_| QueueError::Closed),
            };
            Box::pin(async move { result })
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use chrono::{DateTime, Duration, Utc};
    use proptest::prelude::*;

    /// Instants within `spread_hours` of `anchor`, at second resolution
    pub fn instant_near(
        anchor: DateTime<Utc>,
        spread_hours: i64,
    ) -> impl Strategy<Value = DateTime<Utc>> {
        let spread = spread_hours * 3600;
        (-spread..=spread).prop_map(move |secs| anchor + Duration::seconds(secs))
    }

    /// Like [`instant_near`], but sometimes unset
    pub fn maybe_instant_near(
        anchor: DateTime<Utc>,
        spread_hours: i64,
    ) -> impl Strategy<Value = Option<DateTime<Utc>>> {
        proptest::option::of(instant_near(anchor, spread_hours))
    }
}

// Re-export commonly used items
pub use mocks::{
    FixedClock, FixedRandom, RecordingTaskQueue, SequentialIdGenerator, UnavailableRandom,
    test_clock,
};
pub use reducer_test::{ReducerTest, assertions};
