// Job Orchestrator - composes registry, dispatch, enqueue, admin and workers

use crate::application::admin::QueueAdmin;
use crate::application::barrier::CompletionBarrier;
use crate::application::dispatcher::Dispatcher;
use crate::application::enqueue::{BatchEnqueuer, JobPolicy};
use crate::application::pipeline::JobPipeline;
use crate::application::registry::HandlerRegistry;
use crate::application::worker::constants::{
    BARRIER_POLL_INTERVAL, CLEAN_BATCH_LIMIT, DEFAULT_POLL_INTERVAL,
};
use crate::application::worker::WorkerPool;
use crate::domain::{
    CleanBucket, JobCounts, JobId, JobItem, JobName, JobRecord, JobStatus, QueueName, QueueStatus,
};
use crate::error::Result;
use crate::port::{EventBus, QueueEngine};
use std::sync::Arc;
use std::time::Duration;

/// Tunables for the orchestration layer
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub poll_interval: Duration,
    pub barrier_interval: Duration,
    pub clean_batch_limit: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            barrier_interval: BARRIER_POLL_INTERVAL,
            clean_batch_limit: CLEAN_BATCH_LIMIT,
        }
    }
}

/// Single entry point for the execution pipeline and the control plane
pub struct JobOrchestrator {
    registry: Arc<HandlerRegistry>,
    dispatcher: Arc<Dispatcher>,
    enqueuer: BatchEnqueuer,
    admin: Arc<QueueAdmin>,
    barrier: CompletionBarrier,
    pool: WorkerPool,
}

impl JobOrchestrator {
    /// Wire the orchestrator with the in-process pipeline as event bus
    pub fn new(
        registry: HandlerRegistry,
        engine: Arc<dyn QueueEngine>,
        policy: JobPolicy,
        config: OrchestratorConfig,
    ) -> Self {
        let registry = Arc::new(registry);
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry)));
        let bus: Arc<dyn EventBus> = Arc::new(JobPipeline::new(Arc::clone(&dispatcher)));
        Self::with_event_bus(registry, dispatcher, engine, bus, policy, config)
    }

    /// Wire the orchestrator with a custom event bus
    pub fn with_event_bus(
        registry: Arc<HandlerRegistry>,
        dispatcher: Arc<Dispatcher>,
        engine: Arc<dyn QueueEngine>,
        bus: Arc<dyn EventBus>,
        policy: JobPolicy,
        config: OrchestratorConfig,
    ) -> Self {
        let admin = Arc::new(
            QueueAdmin::new(Arc::clone(&engine), Arc::clone(&registry))
                .with_clean_batch_limit(config.clean_batch_limit),
        );
        let barrier =
            CompletionBarrier::new(Arc::clone(&admin)).with_interval(config.barrier_interval);
        let enqueuer = BatchEnqueuer::new(Arc::clone(&registry), Arc::clone(&engine), policy);
        let pool = WorkerPool::new(engine, bus).with_poll_interval(config.poll_interval);

        Self {
            registry,
            dispatcher,
            enqueuer,
            admin,
            barrier,
            pool,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Start one worker per queue
    pub fn start(&mut self) {
        self.pool.start();
    }

    /// Stop claiming and wait for in-flight jobs
    pub async fn stop(&self) {
        self.pool.stop().await;
    }

    pub async fn run(&self, record: &JobRecord) -> Result<JobStatus> {
        self.dispatcher.run(record).await
    }

    pub async fn queue(&self, item: JobItem) -> Result<()> {
        self.enqueuer.queue(item).await
    }

    pub async fn queue_all(&self, items: Vec<JobItem>) -> Result<()> {
        self.enqueuer.queue_all(items).await
    }

    pub fn set_concurrency(&self, queue: QueueName, concurrency: usize) -> Result<()> {
        self.pool.set_concurrency(queue, concurrency)
    }

    pub fn concurrency(&self, queue: QueueName) -> Option<usize> {
        self.pool.concurrency(queue)
    }

    pub async fn status(&self, queue: QueueName) -> Result<QueueStatus> {
        self.admin.status(queue).await
    }

    pub async fn pause(&self, queue: QueueName) -> Result<()> {
        self.admin.pause(queue).await
    }

    pub async fn resume(&self, queue: QueueName) -> Result<()> {
        self.admin.resume(queue).await
    }

    pub async fn drain(&self, queue: QueueName) -> Result<u64> {
        self.admin.drain(queue).await
    }

    pub async fn clean(&self, queue: QueueName, bucket: CleanBucket) -> Result<Vec<JobId>> {
        self.admin.clean(queue, bucket).await
    }

    pub async fn counts(&self, queue: QueueName) -> Result<JobCounts> {
        self.admin.counts(queue).await
    }

    pub async fn remove_job(&self, name: JobName, id: &str) -> Result<bool> {
        self.admin.remove_job(name, id).await
    }

    pub async fn wait_for_queue_completion(&self, queues: &[QueueName]) -> Result<()> {
        self.barrier.wait_for_queue_completion(queues).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::{handler_fn, JobBinding, JobProvider};
    use crate::application::worker::tests::eventually;
    use crate::domain::{EntityJob, QueueAllJob};
    use crate::port::queue_engine::mocks::MockQueueEngine;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Binds every job to its queue and counts handled jobs
    struct CountingService {
        handled: Arc<AtomicUsize>,
    }

    impl JobProvider for CountingService {
        fn name(&self) -> &'static str {
            "CountingService"
        }

        fn bindings(&self) -> Vec<JobBinding> {
            JobName::ALL
                .iter()
                .map(|name| {
                    let handled = self.handled.clone();
                    JobBinding::new(
                        *name,
                        crate::application::registry::tests::default_queue(*name),
                        "handle",
                        handler_fn(move |_| {
                            let handled = handled.clone();
                            async move {
                                tokio::time::sleep(Duration::from_millis(10)).await;
                                handled.fetch_add(1, Ordering::SeqCst);
                                Ok(JobStatus::Success)
                            }
                        }),
                    )
                })
                .collect()
        }
    }

    fn orchestrator() -> (JobOrchestrator, Arc<MockQueueEngine>, Arc<AtomicUsize>) {
        let handled = Arc::new(AtomicUsize::new(0));
        let provider: Arc<dyn JobProvider> = Arc::new(CountingService {
            handled: handled.clone(),
        });
        let registry = HandlerRegistry::setup(&[provider]).unwrap();
        let engine = Arc::new(MockQueueEngine::new());
        let config = OrchestratorConfig {
            poll_interval: Duration::from_millis(5),
            barrier_interval: Duration::from_millis(10),
            ..Default::default()
        };
        (
            JobOrchestrator::new(registry, engine.clone(), JobPolicy::default(), config),
            engine,
            handled,
        )
    }

    #[tokio::test]
    async fn test_enqueued_jobs_run_through_registered_handlers() {
        let (mut orchestrator, _engine, handled) = orchestrator();
        orchestrator.start();

        orchestrator
            .queue_all(vec![
                JobItem::AssetGenerateThumbnails(EntityJob { id: Uuid::new_v4() }),
                JobItem::AssetExtractMetadata(EntityJob { id: Uuid::new_v4() }),
                JobItem::FacialRecognitionQueueAll(QueueAllJob::default()),
            ])
            .await
            .unwrap();

        eventually(Duration::from_secs(2), || handled.load(Ordering::SeqCst) == 3).await;
        orchestrator
            .wait_for_queue_completion(&QueueName::ALL)
            .await
            .unwrap();

        let counts = orchestrator
            .counts(QueueName::ThumbnailGeneration)
            .await
            .unwrap();
        assert_eq!(counts.completed, 1);
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_paused_queue_holds_jobs_until_resumed() {
        let (mut orchestrator, _engine, handled) = orchestrator();
        orchestrator.start();
        orchestrator.pause(QueueName::Sidecar).await.unwrap();

        orchestrator
            .queue(JobItem::SidecarCheck(EntityJob { id: Uuid::new_v4() }))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handled.load(Ordering::SeqCst), 0);
        assert!(orchestrator.status(QueueName::Sidecar).await.unwrap().is_paused);

        orchestrator.resume(QueueName::Sidecar).await.unwrap();
        eventually(Duration::from_secs(2), || handled.load(Ordering::SeqCst) == 1).await;
        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_run_dispatches_directly() {
        let (orchestrator, engine, handled) = orchestrator();

        let record = JobItem::UserDeleteCheck(Default::default())
            .into_record()
            .unwrap();
        let status = orchestrator.run(&record).await.unwrap();

        assert_eq!(status, JobStatus::Success);
        assert_eq!(handled.load(Ordering::SeqCst), 1);
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_set_concurrency_reaches_pool() {
        let (mut orchestrator, _, _) = orchestrator();
        orchestrator.start();

        orchestrator
            .set_concurrency(QueueName::FacialRecognition, 5)
            .unwrap();
        assert_eq!(orchestrator.concurrency(QueueName::FacialRecognition), Some(5));
        orchestrator.stop().await;
    }
}
