//! Background image processing.
//!
//! The post aggregate enqueues an [`ImageTask`] after an upload is attached.
//! [`ImageWorker`] drains the bounded channel, reads the original blob and
//! writes one downscaled copy per [`ResizeVariant`]. Failures are logged and
//! counted; nothing is retried.

use super::resize::{ResizeVariant, resize};
use eventgram_core::blob_store::{Blob, BlobStore};
use eventgram_core::task_queue::{QueueError, TaskQueue};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Request to derive variants of an uploaded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTask {
    /// Blob name of the original upload
    pub filename: String,
}

/// Task queue backed by a bounded tokio channel.
///
/// Enqueueing never waits: a full channel rejects the task.
#[derive(Debug, Clone)]
pub struct ChannelTaskQueue {
    sender: mpsc::Sender<ImageTask>,
}

/// Creates a queue and the receiver an [`ImageWorker`] drains.
#[must_use]
pub fn channel(capacity: usize) -> (ChannelTaskQueue, mpsc::Receiver<ImageTask>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (ChannelTaskQueue { sender }, receiver)
}

impl TaskQueue<ImageTask> for ChannelTaskQueue {
    fn enqueue(
        &self,
        task: ImageTask,
    ) -> Pin<Box<dyn Future<Output = Result<(), QueueError>> + Send + '_>> {
        let result = self.sender.try_send(task).map_err(|error| match error {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Closed(_) => QueueError::Closed,
        });
        Box::pin(async move { result })
    }
}

/// Produces resized variants of uploaded images.
pub struct ImageWorker {
    blobs: Arc<dyn BlobStore>,
    variants: Vec<ResizeVariant>,
}

impl ImageWorker {
    /// Creates a worker writing `variants` into `blobs`.
    #[must_use]
    pub fn new(blobs: Arc<dyn BlobStore>, variants: Vec<ResizeVariant>) -> Self {
        Self { blobs, variants }
    }

    /// Processes tasks until every sender is dropped.
    pub async fn run(self, mut tasks: mpsc::Receiver<ImageTask>) {
        tracing::info!(variants = self.variants.len(), "Image worker started");
        while let Some(task) = tasks.recv().await {
            self.process(&task).await;
        }
        tracing::info!("Image worker stopped");
    }

    /// Writes every variant of one upload; returns how many were written.
    #[tracing::instrument(skip(self, task), fields(filename = %task.filename))]
    pub async fn process(&self, task: &ImageTask) -> usize {
        let original = match self.blobs.get(task.filename.clone()).await {
            Ok(blob) => blob,
            Err(error) => {
                tracing::error!(error = %error, "Failed to read uploaded image");
                metrics::counter!("eventgram_image_tasks_total", "outcome" => "failed").increment(1);
                return 0;
            },
        };

        let mut written = 0;
        for variant in &self.variants {
            let data = original.data.clone();
            let target = variant.clone();
            let resized = match tokio::task::spawn_blocking(move || resize(&data, &target)).await {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(error)) => {
                    tracing::error!(variant = %variant.name, error = %error, "Failed to resize image");
                    continue;
                },
                Err(error) => {
                    tracing::error!(variant = %variant.name, error = %error, "Resize task aborted");
                    continue;
                },
            };

            let name = variant.filename(&task.filename);
            match self
                .blobs
                .put(name.clone(), Blob::new(original.content_type.clone(), resized))
                .await
            {
                Ok(_) => {
                    tracing::debug!(variant = %variant.name, blob = %name, "Image variant written");
                    written += 1;
                },
                Err(error) => {
                    tracing::error!(variant = %variant.name, error = %error, "Failed to store image variant");
                },
            }
        }

        let outcome = if written == self.variants.len() {
            "processed"
        } else {
            "failed"
        };
        metrics::counter!("eventgram_image_tasks_total", "outcome" => outcome).increment(1);
        tracing::info!(written, "Image processed");
        written
    }
}
