// Batch Enqueuer - routes job items to their queues and submits them

pub mod policy;

pub use policy::{JobPolicy, OptionsRule};

use crate::application::registry::HandlerRegistry;
use crate::domain::{JobItem, QueueName};
use crate::error::Result;
use crate::port::{NewJob, QueueEngine};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Submits job items, in bulk where possible
///
/// Items whose options carry a dedup key are sent through single `add`
/// calls and never merged into a bulk batch. Everything else is grouped into
/// one `add_bulk` per queue.
pub struct BatchEnqueuer {
    registry: Arc<HandlerRegistry>,
    engine: Arc<dyn QueueEngine>,
    policy: JobPolicy,
}

impl BatchEnqueuer {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        engine: Arc<dyn QueueEngine>,
        policy: JobPolicy,
    ) -> Self {
        Self {
            registry,
            engine,
            policy,
        }
    }

    /// Enqueue one item
    pub async fn queue(&self, item: JobItem) -> Result<()> {
        self.queue_all(vec![item]).await
    }

    /// Enqueue a batch of items
    ///
    /// Every queue is resolved before the first engine call, so an item naming
    /// an unbound job fails the batch without submitting anything. Submissions
    /// run concurrently; the first failure is returned once all have settled.
    /// Submissions the engine already accepted are not rolled back.
    pub async fn queue_all(&self, items: Vec<JobItem>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut singles: Vec<(QueueName, NewJob)> = Vec::new();
        let mut by_queue: BTreeMap<QueueName, Vec<NewJob>> = BTreeMap::new();

        for item in items {
            let queue = self.registry.queue_for(item.name())?;
            let options = self.policy.options_for(&item);
            let job = NewJob {
                name: item.name().to_string(),
                data: item.data()?,
                options,
            };

            if job.options.is_deduplicated() {
                singles.push((queue, job));
            } else {
                by_queue.entry(queue).or_default().push(job);
            }
        }

        debug!(
            single = singles.len(),
            bulk_queues = by_queue.len(),
            "Submitting jobs"
        );

        let mut calls: Vec<BoxFuture<'_, Result<()>>> =
            Vec::with_capacity(singles.len() + by_queue.len());
        for (queue, job) in singles {
            let engine = &self.engine;
            calls.push(async move { engine.add(queue, job).await.map(|_| ()) }.boxed());
        }
        for (queue, jobs) in by_queue {
            let engine = &self.engine;
            calls.push(async move { engine.add_bulk(queue, jobs).await.map(|_| ()) }.boxed());
        }

        let results = join_all(calls).await;
        if let Some(err) = results.into_iter().find_map(|r| r.err()) {
            error!(error = %err, "Failed to enqueue jobs");
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::tests::{full_provider, TableProvider};
    use crate::application::registry::JobProvider;
    use crate::domain::{
        AlbumNotificationJob, EmptyJob, EntityJob, JobName, JobOptions, QueueAllJob,
    };
    use crate::error::AppError;
    use crate::port::queue_engine::mocks::{EngineCall, MockQueueEngine};
    use serde_json::json;
    use uuid::Uuid;

    fn enqueuer(policy: JobPolicy) -> (BatchEnqueuer, Arc<MockQueueEngine>) {
        let registry = Arc::new(HandlerRegistry::setup(&[full_provider()]).unwrap());
        let engine = Arc::new(MockQueueEngine::new());
        (
            BatchEnqueuer::new(registry, engine.clone(), policy),
            engine,
        )
    }

    fn thumbnail(id: Uuid) -> JobItem {
        JobItem::AssetGenerateThumbnails(EntityJob { id })
    }

    #[tokio::test]
    async fn test_empty_batch_issues_no_engine_call() {
        let (enqueuer, engine) = enqueuer(JobPolicy::default());

        enqueuer.queue_all(vec![]).await.unwrap();
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_same_queue_items_share_one_bulk_call() {
        let (enqueuer, engine) = enqueuer(JobPolicy::default());
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();

        enqueuer
            .queue_all(ids.iter().map(|id| thumbnail(*id)).collect())
            .await
            .unwrap();

        let calls = engine.submissions();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            EngineCall::AddBulk { queue, jobs } => {
                assert_eq!(*queue, QueueName::ThumbnailGeneration);
                assert_eq!(jobs.len(), 5);
                for (job, id) in jobs.iter().zip(&ids) {
                    assert_eq!(job.name, "AssetGenerateThumbnails");
                    assert_eq!(job.data, json!({"id": id}));
                    assert_eq!(job.options, JobOptions::default());
                }
            }
            other => panic!("expected bulk call, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_deduplicated_item_goes_through_single_add() {
        let (enqueuer, engine) = enqueuer(JobPolicy::default());
        let asset = Uuid::new_v4();

        enqueuer
            .queue(JobItem::StorageTemplateMigrationSingle(EntityJob { id: asset }))
            .await
            .unwrap();

        let calls = engine.submissions();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            EngineCall::Add { queue, job } => {
                assert_eq!(*queue, QueueName::StorageTemplateMigration);
                assert_eq!(job.options.job_id, Some(asset.to_string()));
            }
            other => panic!("expected single add, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mixed_batch_partitions_by_queue_and_dedup() {
        // A → X, B → Y, and a second A carrying a dedup key
        let keyed = Uuid::new_v4();
        let policy = JobPolicy::default().with_rule(JobName::AssetGenerateThumbnails, move |item| {
            match item {
                JobItem::AssetGenerateThumbnails(job) if job.id == keyed => JobOptions {
                    job_id: Some("k".to_string()),
                    ..Default::default()
                },
                _ => JobOptions::default(),
            }
        });
        let (enqueuer, engine) = enqueuer(policy);
        let plain = Uuid::new_v4();

        enqueuer
            .queue_all(vec![
                thumbnail(plain),
                JobItem::AssetDeleteCheck(EmptyJob {}),
                thumbnail(keyed),
            ])
            .await
            .unwrap();

        let calls = engine.submissions();
        assert_eq!(calls.len(), 3);

        let singles: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::Add { queue, job } => Some((*queue, job.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(singles.len(), 1);
        assert_eq!(singles[0].0, QueueName::ThumbnailGeneration);
        assert_eq!(singles[0].1.data, json!({"id": keyed}));
        assert_eq!(singles[0].1.options.job_id.as_deref(), Some("k"));

        let bulks: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::AddBulk { queue, jobs } => Some((*queue, jobs.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(bulks.len(), 2);

        let thumbs = bulks
            .iter()
            .find(|(q, _)| *q == QueueName::ThumbnailGeneration)
            .unwrap();
        assert_eq!(thumbs.1.len(), 1);
        assert_eq!(thumbs.1[0].data, json!({"id": plain}));

        let background = bulks
            .iter()
            .find(|(q, _)| *q == QueueName::BackgroundTask)
            .unwrap();
        assert_eq!(background.1.len(), 1);
        assert_eq!(background.1[0].name, "AssetDeleteCheck");
    }

    #[tokio::test]
    async fn test_repeat_album_updates_coalesce_in_engine() {
        let (enqueuer, engine) = enqueuer(JobPolicy::default());
        let update = JobItem::NotifyAlbumUpdate(AlbumNotificationJob {
            id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            delay: None,
        });

        enqueuer
            .queue_all(vec![update.clone(), update])
            .await
            .unwrap();

        assert_eq!(engine.submissions().len(), 2);
        assert_eq!(engine.jobs(QueueName::Notification).len(), 1);
    }

    #[tokio::test]
    async fn test_unbound_job_fails_before_any_submission() {
        let partial: Arc<dyn JobProvider> = Arc::new(TableProvider {
            name: "SweepService",
            table: vec![(JobName::AssetDeleteCheck, QueueName::BackgroundTask)],
        });
        let mut registry = HandlerRegistry::new();
        registry.register(&[partial]).unwrap();
        let engine = Arc::new(MockQueueEngine::new());
        let enqueuer =
            BatchEnqueuer::new(Arc::new(registry), engine.clone(), JobPolicy::default());

        let err = enqueuer
            .queue_all(vec![
                JobItem::AssetDeleteCheck(EmptyJob {}),
                JobItem::FacialRecognitionQueueAll(QueueAllJob::default()),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_engine_rejection_fails_the_whole_batch() {
        let (enqueuer, engine) = enqueuer(JobPolicy::default());
        engine.fail_submissions(true);

        let err = enqueuer
            .queue_all(vec![thumbnail(Uuid::new_v4())])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
    }
}
