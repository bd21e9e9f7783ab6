// Worker Pool - one worker per queue, explicit start/stop

use super::constants::{DEFAULT_CONCURRENCY, DEFAULT_POLL_INTERVAL};
use super::shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
use super::QueueWorker;
use crate::domain::QueueName;
use crate::error::{AppError, Result};
use crate::port::{EventBus, QueueEngine};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

struct WorkerHandle {
    concurrency: watch::Sender<usize>,
    stopped: watch::Receiver<bool>,
}

/// Owns the worker of every queue
///
/// `start` is called once before the pool is shared; afterwards every
/// operation takes `&self` and only talks to workers over channels.
pub struct WorkerPool {
    engine: Arc<dyn QueueEngine>,
    bus: Arc<dyn EventBus>,
    poll_interval: Duration,
    workers: HashMap<QueueName, WorkerHandle>,
    shutdown_tx: ShutdownSender,
    shutdown: ShutdownToken,
}

impl WorkerPool {
    pub fn new(engine: Arc<dyn QueueEngine>, bus: Arc<dyn EventBus>) -> Self {
        let (shutdown_tx, shutdown) = shutdown_channel();
        Self {
            engine,
            bus,
            poll_interval: DEFAULT_POLL_INTERVAL,
            workers: HashMap::new(),
            shutdown_tx,
            shutdown,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Spawn one worker per queue with the default concurrency
    pub fn start(&mut self) {
        if !self.workers.is_empty() {
            warn!("Worker pool already started");
            return;
        }

        for queue in QueueName::ALL {
            let (concurrency_tx, concurrency_rx) = watch::channel(DEFAULT_CONCURRENCY);
            let (stopped_tx, stopped_rx) = watch::channel(false);
            let worker = QueueWorker::new(
                queue,
                Arc::clone(&self.engine),
                Arc::clone(&self.bus),
                concurrency_rx,
            )
            .with_poll_interval(self.poll_interval);
            let token = self.shutdown.clone();

            tokio::spawn(async move {
                if let Err(e) = worker.run(token).await {
                    error!(queue = %queue, error = %e, "Worker exited with error");
                }
                let _ = stopped_tx.send(true);
            });

            self.workers.insert(
                queue,
                WorkerHandle {
                    concurrency: concurrency_tx,
                    stopped: stopped_rx,
                },
            );
        }

        info!(workers = self.workers.len(), "Worker pool started");
    }

    /// Change how many jobs a running worker keeps in flight
    ///
    /// # Errors
    /// - AppError::Validation if `concurrency` is 0
    pub fn set_concurrency(&self, queue: QueueName, concurrency: usize) -> Result<()> {
        if concurrency == 0 {
            return Err(AppError::Validation(format!(
                "Concurrency for {} must be at least 1",
                queue
            )));
        }

        match self.workers.get(&queue) {
            Some(handle) => {
                handle.concurrency.send_replace(concurrency);
                info!(queue = %queue, concurrency, "Concurrency updated");
            }
            None => warn!(queue = %queue, "Unable to set queue concurrency, worker not found"),
        }
        Ok(())
    }

    /// Current concurrency of a queue's worker
    pub fn concurrency(&self, queue: QueueName) -> Option<usize> {
        self.workers
            .get(&queue)
            .map(|handle| *handle.concurrency.borrow())
    }

    /// Signal shutdown and wait for every worker to drain its in-flight jobs
    pub async fn stop(&self) {
        info!("Stopping worker pool");
        self.shutdown_tx.shutdown();

        join_all(self.workers.values().map(|handle| {
            let mut stopped = handle.stopped.clone();
            async move {
                let _ = stopped.wait_for(|done| *done).await;
            }
        }))
        .await;

        info!("Worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::worker::tests::{eventually, job};
    use crate::domain::EngineJobState;
    use crate::port::event_bus::mocks::RecordingEventBus;
    use crate::port::queue_engine::mocks::MockQueueEngine;

    fn pool(hold: Duration) -> (WorkerPool, Arc<MockQueueEngine>, Arc<RecordingEventBus>) {
        let engine = Arc::new(MockQueueEngine::new());
        let bus = Arc::new(RecordingEventBus::new(hold));
        let pool = WorkerPool::new(engine.clone(), bus.clone())
            .with_poll_interval(Duration::from_millis(5));
        (pool, engine, bus)
    }

    #[tokio::test]
    async fn test_start_creates_one_worker_per_queue() {
        let (mut pool, engine, bus) = pool(Duration::ZERO);
        for queue in QueueName::ALL {
            engine.add(queue, job("AssetDeleteCheck")).await.unwrap();
        }

        pool.start();
        for queue in QueueName::ALL {
            assert_eq!(pool.concurrency(queue), Some(DEFAULT_CONCURRENCY));
        }

        eventually(Duration::from_secs(2), || {
            bus.started_ids().len() == QueueName::ALL.len()
        })
        .await;
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_set_concurrency_raises_throughput() {
        let (mut pool, engine, bus) = pool(Duration::from_millis(40));
        let queue = QueueName::ThumbnailGeneration;
        engine
            .add_bulk(queue, (0..6).map(|_| job("AssetGenerateThumbnails")).collect())
            .await
            .unwrap();

        pool.start();
        eventually(Duration::from_secs(2), || bus.in_flight() == 1).await;
        pool.set_concurrency(queue, 3).unwrap();
        assert_eq!(pool.concurrency(queue), Some(3));

        eventually(Duration::from_secs(2), || {
            engine
                .jobs(queue)
                .iter()
                .all(|j| j.state == EngineJobState::Completed)
        })
        .await;
        pool.stop().await;

        assert_eq!(bus.max_in_flight(), 3);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_rejected() {
        let (mut pool, _, _) = pool(Duration::ZERO);
        pool.start();

        let err = pool.set_concurrency(QueueName::Sidecar, 0).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(pool.concurrency(QueueName::Sidecar), Some(DEFAULT_CONCURRENCY));
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_set_concurrency_before_start_is_a_noop() {
        let (pool, _, _) = pool(Duration::ZERO);

        pool.set_concurrency(QueueName::Notification, 4).unwrap();
        assert_eq!(pool.concurrency(QueueName::Notification), None);
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_jobs() {
        let (mut pool, engine, bus) = pool(Duration::from_millis(60));
        let queue = QueueName::BackgroundTask;
        engine.add(queue, job("UserDeleteCheck")).await.unwrap();

        pool.start();
        eventually(Duration::from_secs(2), || bus.in_flight() == 1).await;
        pool.stop().await;

        assert_eq!(bus.in_flight(), 0);
        assert_eq!(engine.jobs(queue)[0].state, EngineJobState::Completed);
    }
}
