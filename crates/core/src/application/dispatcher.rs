// Dispatcher - routes one job record to its handler

use crate::application::registry::HandlerRegistry;
use crate::domain::{JobItem, JobName, JobRecord, JobStatus};
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// Stateless router over the immutable handler table. Safe to call
/// concurrently from any number of tasks.
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// Run a job through its handler
    ///
    /// Unknown job names (e.g. left over from an older deployment) are
    /// skipped, never raised. Payload decode errors and handler errors are
    /// returned unchanged; failure policy belongs to the caller.
    pub async fn run(&self, record: &JobRecord) -> Result<JobStatus> {
        let entry = match record
            .name
            .parse::<JobName>()
            .ok()
            .and_then(|name| self.registry.lookup(name))
        {
            Some(entry) => entry,
            None => {
                warn!(job = %record.name, "Skipping unknown job");
                return Ok(JobStatus::Skipped);
            }
        };

        let item = JobItem::decode(entry.job_name, &record.data)?;
        debug!(job = %entry.job_name, handler = %entry.label, "Dispatching job");
        entry.handler.handle(item).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::{handler_fn, JobBinding, JobProvider};
    use crate::domain::{EntityJob, QueueName};
    use crate::error::AppError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ThumbnailService {
        calls: Arc<AtomicUsize>,
    }

    impl JobProvider for ThumbnailService {
        fn name(&self) -> &'static str {
            "ThumbnailService"
        }

        fn bindings(&self) -> Vec<JobBinding> {
            let calls = self.calls.clone();
            vec![
                JobBinding::new(
                    JobName::AssetGenerateThumbnails,
                    QueueName::ThumbnailGeneration,
                    "generate",
                    handler_fn(move |job| {
                        let calls = calls.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            match job {
                                JobItem::AssetGenerateThumbnails(EntityJob { .. }) => {
                                    Ok(JobStatus::Success)
                                }
                                _ => Ok(JobStatus::Failed),
                            }
                        }
                    }),
                ),
                JobBinding::new(
                    JobName::PersonGenerateThumbnail,
                    QueueName::ThumbnailGeneration,
                    "person",
                    handler_fn(|_| async {
                        Err(AppError::Execution("face crop missing".to_string()))
                    }),
                ),
            ]
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider: Arc<dyn JobProvider> = Arc::new(ThumbnailService {
            calls: calls.clone(),
        });
        let mut registry = HandlerRegistry::new();
        registry.register(&[provider]).unwrap();
        (Dispatcher::new(Arc::new(registry)), calls)
    }

    #[tokio::test]
    async fn test_run_invokes_handler_and_returns_its_status() {
        let (dispatcher, calls) = dispatcher();
        let record = JobRecord::new(
            "AssetGenerateThumbnails",
            json!({"id": uuid::Uuid::new_v4()}),
        );

        let status = dispatcher.run(&record).await.unwrap();
        assert_eq!(status, JobStatus::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_skips_names_outside_the_taxonomy() {
        let (dispatcher, calls) = dispatcher();
        let record = JobRecord::new("LibraryScanLegacy", json!({}));

        let status = dispatcher.run(&record).await.unwrap();
        assert_eq!(status, JobStatus::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_skips_known_names_without_a_handler() {
        let (dispatcher, _) = dispatcher();
        let record = JobRecord::new("SidecarCheck", json!({"id": uuid::Uuid::new_v4()}));

        assert_eq!(dispatcher.run(&record).await.unwrap(), JobStatus::Skipped);
    }

    #[tokio::test]
    async fn test_handler_errors_propagate() {
        let (dispatcher, _) = dispatcher();
        let record = JobRecord::new(
            "PersonGenerateThumbnail",
            json!({"id": uuid::Uuid::new_v4()}),
        );

        let err = dispatcher.run(&record).await.unwrap_err();
        assert!(matches!(err, AppError::Execution(_)));
    }

    #[tokio::test]
    async fn test_bad_payload_is_an_error_not_a_skip() {
        let (dispatcher, calls) = dispatcher();
        let record = JobRecord::new("AssetGenerateThumbnails", json!({"id": 42}));

        let err = dispatcher.run(&record).await.unwrap_err();
        assert!(matches!(err, AppError::Domain(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
