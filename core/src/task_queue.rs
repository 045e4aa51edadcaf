//! Best-effort task queue abstraction.
//!
//! Enqueueing can fail independently of the request that produced the task.
//! Callers log the failure and carry on; nothing here retries.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors returned when a task cannot be enqueued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The queue is at capacity.
    #[error("Task queue is full")]
    Full,

    /// The consumer has gone away.
    #[error("Task queue is closed")]
    Closed,

    /// The backend refused the task.
    #[error("Task rejected: {0}")]
    Rejected(String),
}

/// Queue accepting tasks of type `T` for asynchronous processing.
pub trait TaskQueue<T>: Send + Sync {
    /// Hands `task` to the queue.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError`] if the task was not accepted.
    fn enqueue(&self, task: T) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>>;
}
