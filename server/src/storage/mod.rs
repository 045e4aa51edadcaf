//! Storage adapters.
//!
//! - [`memory`]: in-process entity store
//! - [`blobs`]: in-process blob store with public links
//! - [`repo`]: typed helpers over any [`EntityStore`](eventgram_core::entity_store::EntityStore)

pub mod blobs;
pub mod memory;
pub mod repo;

pub use blobs::{InMemoryBlobStore, discard_image, image_blob_name};
pub use memory::InMemoryEntityStore;
