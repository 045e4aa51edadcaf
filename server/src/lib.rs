//! # Eventgram
//!
//! Social event sharing: registered users create time-bounded events and
//! attach text and image posts to the events that are currently running.
//!
//! ## Architecture
//!
//! ```text
//! HTTP request
//!     │  Caller extractor resolves the identity once
//!     ▼
//! Handler (api/) ── loads the records a decision needs
//!     │
//!     ▼
//! Store::send(command)                         request-scoped runtime
//!     │
//!     ├─▶ Reducer (aggregates/)  pure decision over lifecycle rules
//!     │        │
//!     │        ▼
//!     │   Effects: allocate id, insert/put/delete record, store blob,
//!     │            enqueue image task
//!     │        │
//!     └────────┘  facts fed back until the store is quiescent
//!     ▼
//! Outcome ─▶ JSON response or AppError
//! ```
//!
//! Image variants are produced off the request path by the [`images`]
//! worker, fed through a bounded in-process queue.

pub mod aggregates;
pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod images;
pub mod lifecycle;
pub mod server;
pub mod storage;
pub mod types;

pub use config::Config;
pub use error::ApiError;
pub use server::{AppState, build_router};
