//! EventQueue trait: submit a change event, poll its job.

use async_trait::async_trait;
use sentinel_types::{ChangeEvent, Job};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("worker channel closed")]
    Closed,
}

/// Queue of change events awaiting enforcement.
///
/// `status` returns `Ok(None)` for unknown or evicted jobs; the API maps that to 404.
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Enqueue an event; returns the job id immediately.
    async fn submit(&self, event: ChangeEvent) -> Result<String, QueueError>;

    async fn status(&self, job_id: &str) -> Result<Option<Job>, QueueError>;
}
