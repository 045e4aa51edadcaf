//! In-memory blob store.
//!
//! Bucket and public base URL come from [`StorageConfig`] at construction;
//! links have the form `<base>/<bucket>/<name>`.

use crate::config::StorageConfig;
use crate::images::ResizeVariant;
use crate::types::{PostId, UserId};
use eventgram_core::blob_store::{Blob, BlobStore, BlobStoreError};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

type BlobFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BlobStoreError>> + Send + 'a>>;

/// Blob store backed by process memory.
#[derive(Debug, Clone)]
pub struct InMemoryBlobStore {
    config: StorageConfig,
    blobs: Arc<RwLock<HashMap<String, Blob>>>,
}

impl InMemoryBlobStore {
    /// Creates an empty store for the configured bucket.
    #[must_use]
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            blobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Names of every stored blob, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .blobs
            .read()
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

fn poisoned() -> BlobStoreError {
    BlobStoreError::Backend("blob store lock poisoned".to_string())
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, name: String, blob: Blob) -> BlobFuture<'_, String> {
        let link = self.link(&name);
        let result = self
            .blobs
            .write()
            .map_err(|_| poisoned())
            .map(|mut blobs| {
                blobs.insert(name, blob);
                link
            });
        Box::pin(async move { result })
    }

    fn create(&self, name: String, blob: Blob) -> BlobFuture<'_, String> {
        let link = self.link(&name);
        let result = self.blobs.write().map_err(|_| poisoned()).and_then(|mut blobs| {
            match blobs.entry(name) {
                Entry::Occupied(taken) => Err(BlobStoreError::AlreadyExists(taken.key().clone())),
                Entry::Vacant(slot) => {
                    slot.insert(blob);
                    Ok(link)
                },
            }
        });
        Box::pin(async move { result })
    }

    fn get(&self, name: String) -> BlobFuture<'_, Blob> {
        let result = self.blobs.read().map_err(|_| poisoned()).and_then(|blobs| {
            match blobs.get(&name) {
                Some(blob) => Ok(blob.clone()),
                None => Err(BlobStoreError::NotFound(name)),
            }
        });
        Box::pin(async move { result })
    }

    fn delete(&self, name: String) -> BlobFuture<'_, ()> {
        let result = self.blobs.write().map_err(|_| poisoned()).and_then(|mut blobs| {
            match blobs.remove(&name) {
                Some(_) => Ok(()),
                None => Err(BlobStoreError::NotFound(name)),
            }
        });
        Box::pin(async move { result })
    }

    fn link(&self, name: &str) -> String {
        format!(
            "{}/{}/{name}",
            self.config.public_base_url.trim_end_matches('/'),
            self.config.bucket
        )
    }
}

/// Blob name of the image attached to a post.
#[must_use]
pub fn image_blob_name(user: &UserId, post: &PostId) -> String {
    format!("{user}/{post}")
}

/// Deletes an image and its derived variants, once each.
///
/// Variants that were never produced are skipped silently; other failures
/// are logged and otherwise ignored.
pub async fn discard_image(blobs: &dyn BlobStore, name: &str, variants: &[ResizeVariant]) {
    let names = std::iter::once(name.to_string()).chain(variants.iter().map(|v| v.filename(name)));
    let results = futures::future::join_all(names.map(|blob| async move {
        let outcome = blobs.delete(blob.clone()).await;
        (blob, outcome)
    }))
    .await;

    for (blob, outcome) in results {
        match outcome {
            Ok(()) => tracing::debug!(blob = %blob, "Image blob deleted"),
            Err(BlobStoreError::NotFound(_)) => {},
            Err(error) => tracing::warn!(blob = %blob, error = %error, "Failed to delete image blob"),
        }
    }
}
