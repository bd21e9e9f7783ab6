// Worker - per-queue claim loop

pub mod constants;
mod pool;
mod shutdown;

use constants::*;
pub use pool::WorkerPool;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::domain::{QueueName, QueuedJob};
use crate::error::Result;
use crate::port::{EventBus, JobEvent, JobOutcome, QueueEngine};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Worker draining one queue
///
/// Keeps up to `concurrency` jobs in flight. Each claimed job is handed to
/// the event bus as a `JobStart` event; the awaited result decides whether
/// the engine records it completed or failed.
pub struct QueueWorker {
    queue: QueueName,
    engine: Arc<dyn QueueEngine>,
    bus: Arc<dyn EventBus>,
    concurrency: watch::Receiver<usize>,
    poll_interval: Duration,
}

impl QueueWorker {
    pub fn new(
        queue: QueueName,
        engine: Arc<dyn QueueEngine>,
        bus: Arc<dyn EventBus>,
        concurrency: watch::Receiver<usize>,
    ) -> Self {
        Self {
            queue,
            engine,
            bus,
            concurrency,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run worker loop with graceful shutdown support
    ///
    /// On shutdown the worker stops claiming and waits for in-flight jobs.
    /// A concurrency change is picked up without restarting; lowering it
    /// never cancels running jobs.
    pub async fn run(mut self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(queue = %self.queue, "Worker started");
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            if shutdown.is_shutdown() {
                info!(queue = %self.queue, "Worker shutting down");
                break;
            }

            while let Some(result) = in_flight.try_join_next() {
                self.reap(result);
            }

            let limit = *self.concurrency.borrow_and_update();
            if in_flight.len() >= limit {
                // Full: wait for a free slot, a new limit, or shutdown
                tokio::select! {
                    Some(result) = in_flight.join_next() => self.reap(result),
                    Ok(()) = self.concurrency.changed() => {
                        debug!(queue = %self.queue, concurrency = *self.concurrency.borrow(), "Concurrency changed");
                    }
                    _ = shutdown.wait() => {}
                }
                continue;
            }

            match self.engine.claim_next(self.queue).await {
                Ok(Some(job)) => {
                    debug!(queue = %self.queue, job_id = %job.id, job = %job.name, "Claimed job");
                    in_flight.spawn(execute(
                        self.queue,
                        Arc::clone(&self.engine),
                        Arc::clone(&self.bus),
                        job,
                    ));
                }
                Ok(None) => {
                    tokio::select! {
                        _ = sleep(self.poll_interval) => {},
                        _ = shutdown.wait() => {
                            info!(queue = %self.queue, "Worker interrupted during idle");
                        }
                    }
                }
                Err(e) => {
                    error!(queue = %self.queue, error = %e, "Failed to claim job");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!(queue = %self.queue, "Worker interrupted during error recovery");
                        }
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            info!(
                queue = %self.queue,
                in_flight = in_flight.len(),
                "Waiting for in-flight jobs"
            );
        }
        while let Some(result) = in_flight.join_next().await {
            self.reap(result);
        }

        info!(queue = %self.queue, "Worker stopped");
        Ok(())
    }

    fn reap(&self, result: std::result::Result<(), JoinError>) {
        if let Err(e) = result {
            error!(queue = %self.queue, error = %e, "Job slot task aborted");
        }
    }
}

/// Emit one job on the bus and record its outcome
///
/// The emit runs in its own task so a panicking handler fails the job
/// instead of taking the worker down.
async fn execute(
    queue: QueueName,
    engine: Arc<dyn QueueEngine>,
    bus: Arc<dyn EventBus>,
    job: QueuedJob,
) {
    let id = job.id.clone();
    let name = job.name.clone();

    let handle = tokio::spawn(async move { bus.emit(JobEvent::JobStart { queue, job }).await });

    let outcome = match handle.await {
        Ok(Ok(())) => JobOutcome::Completed,
        Ok(Err(e)) => {
            warn!(queue = %queue, job_id = %id, job = %name, error = %e, "Job failed");
            JobOutcome::Failed(e.to_string())
        }
        Err(join_err) => {
            let reason = if join_err.is_panic() {
                format!("Job panicked: {}", name)
            } else {
                format!("Job cancelled: {}", name)
            };
            error!(queue = %queue, job_id = %id, error = %join_err, "{}", reason);
            JobOutcome::Failed(reason)
        }
    };

    if let Err(e) = engine.finish(queue, &id, outcome).await {
        error!(queue = %queue, job_id = %id, error = %e, "Failed to record job outcome");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::{EngineJobState, JobOptions};
    use crate::port::event_bus::mocks::RecordingEventBus;
    use crate::port::queue_engine::mocks::MockQueueEngine;
    use crate::port::NewJob;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    pub(crate) fn job(name: &str) -> NewJob {
        NewJob {
            name: name.to_string(),
            data: json!({}),
            options: JobOptions::default(),
        }
    }

    /// Poll until `check` holds or fail after `limit`
    pub(crate) async fn eventually<F: Fn() -> bool>(limit: Duration, check: F) {
        let started = Instant::now();
        while !check() {
            assert!(started.elapsed() < limit, "condition not met within {limit:?}");
            sleep(Duration::from_millis(5)).await;
        }
    }

    fn count_in(engine: &MockQueueEngine, queue: QueueName, state: EngineJobState) -> usize {
        engine
            .jobs(queue)
            .iter()
            .filter(|j| j.state == state)
            .count()
    }

    fn spawn_worker(
        queue: QueueName,
        engine: Arc<MockQueueEngine>,
        bus: Arc<dyn EventBus>,
        concurrency: usize,
    ) -> (
        ShutdownSender,
        watch::Sender<usize>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let (limit_tx, limit_rx) = watch::channel(concurrency);
        let (sender, token) = shutdown_channel();
        let worker = QueueWorker::new(queue, engine, bus, limit_rx)
            .with_poll_interval(Duration::from_millis(5));
        (sender, limit_tx, tokio::spawn(worker.run(token)))
    }

    struct PanickingBus;

    #[async_trait]
    impl EventBus for PanickingBus {
        async fn emit(&self, _event: JobEvent) -> Result<()> {
            panic!("handler blew up");
        }
    }

    #[tokio::test]
    async fn test_worker_completes_claimed_jobs() {
        let engine = Arc::new(MockQueueEngine::new());
        let bus = Arc::new(RecordingEventBus::new(Duration::ZERO));
        let queue = QueueName::MetadataExtraction;
        engine
            .add_bulk(queue, vec![job("AssetExtractMetadata"), job("AssetExtractMetadata")])
            .await
            .unwrap();

        let (sender, _limit, handle) = spawn_worker(queue, engine.clone(), bus.clone(), 1);
        eventually(Duration::from_secs(2), || {
            count_in(&engine, queue, EngineJobState::Completed) == 2
        })
        .await;

        sender.shutdown();
        handle.await.unwrap().unwrap();
        assert_eq!(bus.started_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_emit_marks_job_failed() {
        let engine = Arc::new(MockQueueEngine::new());
        let bus = Arc::new(RecordingEventBus::new(Duration::ZERO));
        bus.fail_job("SidecarCheck");
        let queue = QueueName::Sidecar;
        engine.add(queue, job("SidecarCheck")).await.unwrap();

        let (sender, _limit, handle) = spawn_worker(queue, engine.clone(), bus, 1);
        eventually(Duration::from_secs(2), || {
            count_in(&engine, queue, EngineJobState::Failed) == 1
        })
        .await;
        sender.shutdown();
        handle.await.unwrap().unwrap();

        let failed = &engine.jobs(queue)[0];
        assert!(failed.failed_reason.as_deref().unwrap().contains("SidecarCheck"));
    }

    #[tokio::test]
    async fn test_panicking_handler_fails_job_and_worker_survives() {
        let engine = Arc::new(MockQueueEngine::new());
        let queue = QueueName::FacialRecognition;
        engine
            .add_bulk(queue, vec![job("FacialRecognition"), job("FacialRecognition")])
            .await
            .unwrap();

        let (sender, _limit, handle) =
            spawn_worker(queue, engine.clone(), Arc::new(PanickingBus), 1);
        eventually(Duration::from_secs(2), || {
            count_in(&engine, queue, EngineJobState::Failed) == 2
        })
        .await;
        sender.shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_concurrency_bounds_in_flight_jobs() {
        let engine = Arc::new(MockQueueEngine::new());
        let bus = Arc::new(RecordingEventBus::new(Duration::from_millis(30)));
        let queue = QueueName::ThumbnailGeneration;
        engine
            .add_bulk(queue, (0..6).map(|_| job("AssetGenerateThumbnails")).collect())
            .await
            .unwrap();

        let (sender, _limit, handle) = spawn_worker(queue, engine.clone(), bus.clone(), 2);
        eventually(Duration::from_secs(2), || {
            count_in(&engine, queue, EngineJobState::Completed) == 6
        })
        .await;
        sender.shutdown();
        handle.await.unwrap().unwrap();

        assert_eq!(bus.max_in_flight(), 2);
    }

    #[tokio::test]
    async fn test_raised_concurrency_applies_to_running_worker() {
        let engine = Arc::new(MockQueueEngine::new());
        let bus = Arc::new(RecordingEventBus::new(Duration::from_millis(40)));
        let queue = QueueName::ThumbnailGeneration;
        engine
            .add_bulk(queue, (0..8).map(|_| job("AssetGenerateThumbnails")).collect())
            .await
            .unwrap();

        let (sender, limit, handle) = spawn_worker(queue, engine.clone(), bus.clone(), 1);
        eventually(Duration::from_secs(2), || bus.in_flight() == 1).await;
        limit.send(4).unwrap();

        eventually(Duration::from_secs(2), || bus.in_flight() == 4).await;
        sender.shutdown();
        handle.await.unwrap().unwrap();

        assert_eq!(bus.max_in_flight(), 4);
        assert_eq!(count_in(&engine, queue, EngineJobState::Active), 0);
    }

    #[tokio::test]
    async fn test_lowered_concurrency_lets_running_jobs_finish() {
        let engine = Arc::new(MockQueueEngine::new());
        let bus = Arc::new(RecordingEventBus::new(Duration::from_millis(150)));
        let queue = QueueName::ThumbnailGeneration;
        engine
            .add_bulk(queue, (0..4).map(|_| job("AssetGenerateThumbnails")).collect())
            .await
            .unwrap();

        let (sender, limit, handle) = spawn_worker(queue, engine.clone(), bus.clone(), 3);
        eventually(Duration::from_secs(2), || bus.in_flight() == 3).await;
        assert_ok!(limit.send(1));

        // Over the new limit: the running three keep going, nothing new is claimed
        sleep(Duration::from_millis(50)).await;
        assert_eq!(bus.in_flight(), 3);
        assert_eq!(bus.started_ids().len(), 3);
        assert_eq!(count_in(&engine, queue, EngineJobState::Waiting), 1);

        eventually(Duration::from_secs(2), || bus.started_ids().len() == 4).await;
        let started = bus.started_ids();
        let jobs = engine.jobs(queue);
        for id in &started[..3] {
            let job = jobs.iter().find(|j| &j.id == id).unwrap();
            assert_eq!(job.state, EngineJobState::Completed);
        }

        eventually(Duration::from_secs(2), || {
            count_in(&engine, queue, EngineJobState::Completed) == 4
        })
        .await;
        sender.shutdown();
        assert_ok!(handle.await.unwrap());

        assert_eq!(bus.max_in_flight(), 3);
    }

    #[tokio::test]
    async fn test_shutdown_lets_in_flight_job_finish() {
        let engine = Arc::new(MockQueueEngine::new());
        let bus = Arc::new(RecordingEventBus::new(Duration::from_millis(80)));
        let queue = QueueName::BackgroundTask;
        engine.add(queue, job("AssetDeleteCheck")).await.unwrap();

        let (sender, _limit, handle) = spawn_worker(queue, engine.clone(), bus.clone(), 1);
        eventually(Duration::from_secs(2), || bus.in_flight() == 1).await;

        sender.shutdown();
        handle.await.unwrap().unwrap();
        assert_eq!(count_in(&engine, queue, EngineJobState::Completed), 1);
    }

    #[tokio::test]
    async fn test_paused_queue_is_not_claimed() {
        let engine = Arc::new(MockQueueEngine::new());
        let bus = Arc::new(RecordingEventBus::new(Duration::ZERO));
        let queue = QueueName::Notification;
        engine.pause(queue).await.unwrap();
        engine.add(queue, job("NotifyAlbumInvite")).await.unwrap();

        let (sender, _limit, handle) = spawn_worker(queue, engine.clone(), bus.clone(), 1);
        sleep(Duration::from_millis(50)).await;
        assert!(bus.events().is_empty());

        engine.resume(queue).await.unwrap();
        eventually(Duration::from_secs(2), || {
            count_in(&engine, queue, EngineJobState::Completed) == 1
        })
        .await;
        sender.shutdown();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_finish_error_does_not_stop_worker() {
        // Job moved on by someone else while running: finish is a conflict
        let engine = Arc::new(MockQueueEngine::new());
        let bus = Arc::new(RecordingEventBus::new(Duration::from_millis(40)));
        let queue = QueueName::Sidecar;
        let id = engine.add(queue, job("SidecarCheck")).await.unwrap();

        let (sender, _limit, handle) = spawn_worker(queue, engine.clone(), bus.clone(), 1);
        eventually(Duration::from_secs(2), || bus.in_flight() == 1).await;
        assert_err!(engine.remove_job(queue, &id).await);
        engine.set_state(queue, &id, EngineJobState::Failed);

        sleep(Duration::from_millis(80)).await;
        assert_err!(engine.finish(queue, &id, JobOutcome::Completed).await);

        // Still claiming after the failed finish
        engine.add(queue, job("SidecarCheck")).await.unwrap();
        eventually(Duration::from_secs(2), || {
            count_in(&engine, queue, EngineJobState::Completed) == 1
        })
        .await;
        sender.shutdown();
        assert_ok!(handle.await.unwrap());
        assert_eq!(count_in(&engine, queue, EngineJobState::Failed), 1);
    }
}
