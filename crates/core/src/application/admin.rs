// Queue Admin - administrative operations on named queues

use crate::application::registry::HandlerRegistry;
use crate::application::worker::constants::{CLEAN_BATCH_LIMIT, CLEAN_GRACE_MS};
use crate::domain::{CleanBucket, JobCounts, JobId, JobName, QueueName, QueueStatus};
use crate::error::Result;
use crate::port::QueueEngine;
use std::sync::Arc;
use tracing::{debug, info};

/// Thin pass-through to the engine keyed by queue name. Engine errors are
/// returned unmodified.
pub struct QueueAdmin {
    engine: Arc<dyn QueueEngine>,
    registry: Arc<HandlerRegistry>,
    clean_batch_limit: u32,
}

impl QueueAdmin {
    pub fn new(engine: Arc<dyn QueueEngine>, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            engine,
            registry,
            clean_batch_limit: CLEAN_BATCH_LIMIT,
        }
    }

    /// Override the per-call cap used by `clean`
    pub fn with_clean_batch_limit(mut self, limit: u32) -> Self {
        self.clean_batch_limit = limit;
        self
    }

    pub async fn status(&self, queue: QueueName) -> Result<QueueStatus> {
        let (active, is_paused) = tokio::try_join!(
            self.engine.active_count(queue),
            self.engine.is_paused(queue)
        )?;

        Ok(QueueStatus {
            is_active: active > 0,
            is_paused,
        })
    }

    pub async fn pause(&self, queue: QueueName) -> Result<()> {
        self.engine.pause(queue).await?;
        info!(queue = %queue, "Queue paused");
        Ok(())
    }

    pub async fn resume(&self, queue: QueueName) -> Result<()> {
        self.engine.resume(queue).await?;
        info!(queue = %queue, "Queue resumed");
        Ok(())
    }

    /// Discard waiting jobs, including delayed jobs whose run time has
    /// passed. Active jobs and delayed jobs not yet due stay.
    pub async fn drain(&self, queue: QueueName) -> Result<u64> {
        let removed = self.engine.drain(queue).await?;
        info!(queue = %queue, removed, "Queue drained");
        Ok(removed)
    }

    /// Purge one terminal bucket with zero retention, up to the batch cap
    pub async fn clean(&self, queue: QueueName, bucket: CleanBucket) -> Result<Vec<JobId>> {
        let removed = self
            .engine
            .clean(queue, bucket, CLEAN_GRACE_MS, self.clean_batch_limit)
            .await?;
        info!(
            queue = %queue,
            bucket = ?bucket,
            removed = removed.len(),
            "Queue cleaned"
        );
        Ok(removed)
    }

    pub async fn counts(&self, queue: QueueName) -> Result<JobCounts> {
        self.engine.job_counts(queue).await
    }

    /// Remove a job by id from the queue its job type routes to
    ///
    /// # Returns
    /// true when a job was found and removed
    pub async fn remove_job(&self, name: JobName, id: &str) -> Result<bool> {
        let queue = self.registry.queue_for(name)?;
        if self.engine.get_job(queue, id).await?.is_none() {
            debug!(queue = %queue, job_id = %id, "Job not found, nothing to remove");
            return Ok(false);
        }
        self.engine.remove_job(queue, id).await
    }
}
