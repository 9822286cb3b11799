//! In-memory job registry
//!
//! Jobs live only for the process lifetime; callers keep the id from the
//! 202 response and poll. The tracker is the single mutation point, so the
//! terminal-status freeze is enforced in exactly one place.

use crate::error::{Error, Result};
use crate::models::{JobKind, JobStatus, ProcessingJob};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Partial update applied to a stored job; `None` fields are left alone
#[derive(Debug, Default, Clone)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub total_images: Option<usize>,
    pub processed_images: Option<usize>,
    pub total_items: Option<usize>,
    pub processed_items: Option<usize>,
}

/// Shared registry of processing jobs
#[derive(Clone)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<Uuid, ProcessingJob>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a new pending job and return its record.
    pub async fn create(&self, kind: JobKind, total_images: usize) -> ProcessingJob {
        let job = ProcessingJob::new(kind, JobStatus::Pending, total_images);
        self.jobs.write().await.insert(job.id, job.clone());

        tracing::info!(job_id = %job.id, kind = ?kind, "Job created");

        job
    }

    pub async fn get(&self, id: Uuid) -> Option<ProcessingJob> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// Merge an update into the stored job.
    ///
    /// Status changes on a terminal job are refused; the stored status wins
    /// and a warning is logged. Counter fields still merge.
    pub async fn update(&self, id: Uuid, update: JobUpdate) -> Result<ProcessingJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("job {}", id)))?;

        if let Some(status) = update.status {
            if job.is_terminal() {
                tracing::warn!(
                    job_id = %id,
                    current = ?job.status,
                    requested = ?status,
                    "Ignoring status change on terminal job"
                );
            } else {
                job.transition_to(status);
            }
        }
        if let Some(total_images) = update.total_images {
            job.total_images = total_images;
        }
        if let Some(processed_images) = update.processed_images {
            job.processed_images = processed_images;
        }
        if let Some(total_items) = update.total_items {
            job.total_items = total_items;
        }
        if let Some(processed_items) = update.processed_items {
            job.processed_items = processed_items;
        }

        Ok(job.clone())
    }

    /// Append a timestamped log line to the job.
    pub async fn append_log(&self, id: Uuid, message: &str) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("job {}", id)))?;

        job.push_log(message);

        Ok(())
    }
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get() {
        let tracker = JobTracker::new();
        let job = tracker.create(JobKind::ImageAnalysis, 2).await;

        let fetched = tracker.get(job.id).await.unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.status, JobStatus::Pending);
        assert_eq!(fetched.total_images, 2);
    }

    #[tokio::test]
    async fn get_unknown_is_none() {
        let tracker = JobTracker::new();
        assert!(tracker.get(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn update_merges_partially() {
        let tracker = JobTracker::new();
        let job = tracker.create(JobKind::ImageAnalysis, 3).await;

        let updated = tracker
            .update(
                job.id,
                JobUpdate {
                    status: Some(JobStatus::Processing),
                    processed_images: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, JobStatus::Processing);
        assert_eq!(updated.processed_images, 1);
        // Untouched fields keep their values
        assert_eq!(updated.total_images, 3);
    }

    #[tokio::test]
    async fn update_unknown_is_not_found() {
        let tracker = JobTracker::new();
        let result = tracker
            .update(Uuid::new_v4(), JobUpdate::default())
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn terminal_status_is_frozen() {
        let tracker = JobTracker::new();
        let job = tracker.create(JobKind::SpreadsheetLoad, 0).await;

        tracker
            .update(
                job.id,
                JobUpdate {
                    status: Some(JobStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let after = tracker
            .update(
                job.id,
                JobUpdate {
                    status: Some(JobStatus::Failed),
                    processed_items: Some(7),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(after.status, JobStatus::Completed);
        // Non-status fields still merge
        assert_eq!(after.processed_items, 7);
    }

    #[tokio::test]
    async fn append_log_records_lines() {
        let tracker = JobTracker::new();
        let job = tracker.create(JobKind::PriceRefresh, 0).await;

        tracker.append_log(job.id, "started").await.unwrap();
        tracker.append_log(job.id, "done").await.unwrap();

        let fetched = tracker.get(job.id).await.unwrap();
        assert_eq!(fetched.logs.len(), 2);
        assert!(fetched.logs[0].ends_with("started"));
    }
}
