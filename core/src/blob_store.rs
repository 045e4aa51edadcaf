//! Blob store abstraction for uploaded images and their derived variants.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Binary object with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// MIME type (`image/png`, ...)
    pub content_type: String,
    /// Raw bytes
    pub data: Vec<u8>,
}

impl Blob {
    /// Creates a blob.
    #[must_use]
    pub fn new(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            data,
        }
    }
}

/// Errors that can occur during blob store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobStoreError {
    /// No blob exists under the name.
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// A blob already exists under the name.
    #[error("Blob already exists: {0}")]
    AlreadyExists(String),

    /// The storage backend failed.
    #[error("Blob backend error: {0}")]
    Backend(String),
}

/// Named blob storage with public links.
pub trait BlobStore: Send + Sync {
    /// Stores `blob` under `name` and returns its public link.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError::Backend`] if the write fails.
    fn put(
        &self,
        name: String,
        blob: Blob,
    ) -> Pin<Box<dyn Future<Output = Result<String, BlobStoreError>> + Send + '_>>;

    /// Stores `blob` under `name` unless a blob already exists there.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError::AlreadyExists`] if `name` is taken, or
    /// [`BlobStoreError::Backend`] if the write fails.
    fn create(
        &self,
        name: String,
        blob: Blob,
    ) -> Pin<Box<dyn Future<Output = Result<String, BlobStoreError>> + Send + '_>>;

    /// Loads the blob stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError::NotFound`] if there is no such blob.
    fn get(
        &self,
        name: String,
    ) -> Pin<Box<dyn Future<Output = Result<Blob, BlobStoreError>> + Send + '_>>;

    /// Deletes the blob stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError::NotFound`] if there is no such blob.
    fn delete(
        &self,
        name: String,
    ) -> Pin<Box<dyn Future<Output = Result<(), BlobStoreError>> + Send + '_>>;

    /// Public link of the blob named `name`.
    fn link(&self, name: &str) -> String;
}
