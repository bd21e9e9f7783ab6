//! Shared wiring for integration tests: real SQLite engine, registry,
//! pipeline and workers.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use conveyor_core::application::{
    handler_fn, HandlerRegistry, JobBinding, JobOrchestrator, JobPolicy, JobProvider,
    OrchestratorConfig,
};
use conveyor_core::domain::{EntityJob, JobItem, JobName, JobStatus, QueueName};
use conveyor_core::error::AppError;
use conveyor_core::port::id_provider::UuidProvider;
use conveyor_core::port::time_provider::SystemTimeProvider;
use conveyor_core::port::TimeProvider;
use conveyor_infra_sqlite::{create_pool, run_migrations, SqliteQueueEngine};
use uuid::Uuid;

/// How long a facial recognition job takes
pub const SLOW_JOB: Duration = Duration::from_millis(300);

pub async fn engine() -> Arc<SqliteQueueEngine> {
    engine_with_clock(Arc::new(SystemTimeProvider)).await
}

pub async fn engine_with_clock(clock: Arc<dyn TimeProvider>) -> Arc<SqliteQueueEngine> {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    Arc::new(SqliteQueueEngine::new(pool, clock, Arc::new(UuidProvider)))
}

pub fn queue_of(name: JobName) -> QueueName {
    match name {
        JobName::AssetGenerateThumbnails | JobName::PersonGenerateThumbnail => {
            QueueName::ThumbnailGeneration
        }
        JobName::AssetExtractMetadata => QueueName::MetadataExtraction,
        JobName::SidecarCheck => QueueName::Sidecar,
        JobName::FacialRecognition | JobName::FacialRecognitionQueueAll => {
            QueueName::FacialRecognition
        }
        JobName::NotifyAlbumUpdate | JobName::NotifyAlbumInvite => QueueName::Notification,
        JobName::StorageTemplateMigration | JobName::StorageTemplateMigrationSingle => {
            QueueName::StorageTemplateMigration
        }
        JobName::AssetDeleteCheck | JobName::UserDeleteCheck => QueueName::BackgroundTask,
    }
}

/// Jobs the handlers have seen, in execution order
#[derive(Clone, Default)]
pub struct Handled(Arc<Mutex<Vec<JobItem>>>);

impl Handled {
    pub fn items(&self) -> Vec<JobItem> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, name: JobName) -> usize {
        self.items().iter().filter(|item| item.name() == name).count()
    }
}

/// Binds every job type to its queue.
///
/// - NotifyAlbumInvite reports `Failed`
/// - SidecarCheck returns an error
/// - FacialRecognition takes [`SLOW_JOB`]
pub struct LibraryService {
    handled: Handled,
}

impl JobProvider for LibraryService {
    fn name(&self) -> &'static str {
        "LibraryService"
    }

    fn bindings(&self) -> Vec<JobBinding> {
        JobName::ALL
            .iter()
            .map(|name| {
                let handled = self.handled.clone();
                JobBinding::new(
                    *name,
                    queue_of(*name),
                    "handle",
                    handler_fn(move |job: JobItem| {
                        let handled = handled.clone();
                        async move {
                            let name = job.name();
                            if name == JobName::FacialRecognition {
                                tokio::time::sleep(SLOW_JOB).await;
                            }
                            handled.0.lock().unwrap().push(job);

                            match name {
                                JobName::NotifyAlbumInvite => Ok(JobStatus::Failed),
                                JobName::SidecarCheck => {
                                    Err(AppError::Execution("sidecar unreadable".to_string()))
                                }
                                _ => Ok(JobStatus::Success),
                            }
                        }
                    }),
                )
            })
            .collect()
    }
}

pub fn orchestrator(engine: Arc<SqliteQueueEngine>, handled: &Handled) -> JobOrchestrator {
    let provider: Arc<dyn JobProvider> = Arc::new(LibraryService {
        handled: handled.clone(),
    });
    let registry = HandlerRegistry::setup(&[provider]).unwrap();
    let config = OrchestratorConfig {
        poll_interval: Duration::from_millis(10),
        barrier_interval: Duration::from_millis(10),
        clean_batch_limit: 1000,
    };
    JobOrchestrator::new(registry, engine, JobPolicy::default(), config)
}

pub fn entity(build: fn(EntityJob) -> JobItem) -> JobItem {
    build(EntityJob { id: Uuid::new_v4() })
}

/// Poll until `check` holds, panicking after five seconds
pub async fn eventually<F, Fut>(what: &str, check: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
