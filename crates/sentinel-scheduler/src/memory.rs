//! In-memory event queue: unbounded channel + one worker, job state in a map.

use crate::{EventQueue, QueueError};
use async_trait::async_trait;
use chrono::Utc;
use sentinel_types::{ChangeEvent, Enforcer, Job, JobStatus, Notifier};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Finished jobs kept for status lookups; older ones are evicted.
pub const MAX_FINISHED_JOBS: usize = 1024;

#[derive(Default)]
struct JobTable {
    jobs: HashMap<String, Job>,
    finished: VecDeque<String>,
}

impl JobTable {
    fn finish(&mut self, job_id: &str, status: JobStatus, summary: serde_json::Value) {
        let Some(job) = self.jobs.get_mut(job_id) else {
            return;
        };
        job.status = status;
        job.updated_at = Utc::now().to_rfc3339();
        job.result_summary = Some(summary);
        self.finished.push_back(job_id.to_string());
        while self.finished.len() > MAX_FINISHED_JOBS {
            if let Some(old) = self.finished.pop_front() {
                self.jobs.remove(&old);
            }
        }
    }
}

/// Queues change events; one worker runs the enforcer on each, in order.
pub struct InMemoryEventQueue {
    jobs: Arc<RwLock<JobTable>>,
    tx: mpsc::UnboundedSender<(String, ChangeEvent)>,
}

impl InMemoryEventQueue {
    /// Create the queue and spawn its worker. Failed enforcements are alerted through `notifier`.
    pub fn new(enforcer: Arc<dyn Enforcer>, notifier: Arc<dyn Notifier>) -> Self {
        let jobs: Arc<RwLock<JobTable>> = Arc::new(RwLock::new(JobTable::default()));
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, ChangeEvent)>();

        let jobs_clone = Arc::clone(&jobs);
        tokio::spawn(async move {
            while let Some((job_id, event)) = rx.recv().await {
                {
                    let mut guard = jobs_clone.write().await;
                    if let Some(job) = guard.jobs.get_mut(&job_id) {
                        job.status = JobStatus::Running;
                        job.updated_at = Utc::now().to_rfc3339();
                    }
                }
                let result = enforcer.enforce(&event).await;
                let (status, summary) = match result {
                    Ok(res) => {
                        tracing::info!(
                            job_id = %job_id,
                            record_id = %event.record_id,
                            enforced = res.enforced(),
                            reason = res.reason(),
                            "event processed"
                        );
                        let summary = serde_json::to_value(res.summary())
                            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }));
                        (JobStatus::Done, summary)
                    }
                    Err(e) => {
                        tracing::error!(
                            job_id = %job_id,
                            record_id = %event.record_id,
                            error = %e,
                            "enforcement failed"
                        );
                        notifier
                            .post_chat_message(&failure_alert(&event.record_id, &e.to_string()))
                            .await;
                        (JobStatus::Failed, serde_json::json!({ "error": e.to_string() }))
                    }
                };
                jobs_clone.write().await.finish(&job_id, status, summary);
            }
        });

        Self { jobs, tx }
    }
}

fn failure_alert(record_id: &str, error: &str) -> String {
    format!(
        ":warning: Failed to enforce protected fields on {}: {}",
        record_id, error
    )
}

#[async_trait]
impl EventQueue for InMemoryEventQueue {
    async fn submit(&self, event: ChangeEvent) -> Result<String, QueueError> {
        let job_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let job = Job {
            job_id: job_id.clone(),
            record_id: event.record_id.clone(),
            status: JobStatus::Pending,
            created_at: now.clone(),
            updated_at: now,
            result_summary: None,
        };
        self.jobs.write().await.jobs.insert(job_id.clone(), job);
        if self.tx.send((job_id.clone(), event)).is_err() {
            self.jobs.write().await.jobs.remove(&job_id);
            return Err(QueueError::Closed);
        }
        Ok(job_id)
    }

    async fn status(&self, job_id: &str) -> Result<Option<Job>, QueueError> {
        Ok(self.jobs.read().await.jobs.get(job_id).cloned())
    }
}
