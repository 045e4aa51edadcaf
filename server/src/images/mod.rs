//! Image pipeline.
//!
//! Uploads are stored as-is by the post aggregate; this module sniffs their
//! format and produces downscaled variants in a background worker.

pub mod resize;
pub mod worker;

pub use resize::{ALLOWED_CONTENT_TYPES, ImageError, ResizeVariant, default_variants, detect_content_type, resize};
pub use worker::{ChannelTaskQueue, ImageTask, ImageWorker, channel};
