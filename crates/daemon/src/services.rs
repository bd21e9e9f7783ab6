//! Job providers wired into the daemon
//!
//! Each service binds its job types to a queue. Handlers record the work
//! they received; the media pipeline behind them lives outside this process.

use conveyor_core::application::{handler_fn, JobBinding, JobHandler, JobProvider};
use conveyor_core::domain::{JobItem, JobName, JobStatus, QueueName};
use std::sync::Arc;
use tracing::{debug, info};

/// Every provider the daemon registers at startup
pub fn providers() -> Vec<Arc<dyn JobProvider>> {
    vec![
        Arc::new(MediaService),
        Arc::new(MetadataService),
        Arc::new(PersonService),
        Arc::new(NotificationService),
        Arc::new(StorageTemplateService),
        Arc::new(HousekeepingService),
    ]
}

/// Handler that logs the job and reports success
fn logged(service: &'static str) -> Arc<dyn JobHandler> {
    handler_fn(move |job: JobItem| async move {
        info!(service, job = %job.name(), "Handling job");
        debug!(service, ?job, "Job payload");
        Ok(JobStatus::Success)
    })
}

pub struct MediaService;

impl JobProvider for MediaService {
    fn name(&self) -> &'static str {
        "MediaService"
    }

    fn bindings(&self) -> Vec<JobBinding> {
        vec![
            JobBinding::new(
                JobName::AssetGenerateThumbnails,
                QueueName::ThumbnailGeneration,
                "handleGenerateThumbnails",
                logged(self.name()),
            ),
            JobBinding::new(
                JobName::PersonGenerateThumbnail,
                QueueName::ThumbnailGeneration,
                "handleGeneratePersonThumbnail",
                logged(self.name()),
            ),
        ]
    }
}

pub struct MetadataService;

impl JobProvider for MetadataService {
    fn name(&self) -> &'static str {
        "MetadataService"
    }

    fn bindings(&self) -> Vec<JobBinding> {
        vec![
            JobBinding::new(
                JobName::AssetExtractMetadata,
                QueueName::MetadataExtraction,
                "handleMetadataExtraction",
                logged(self.name()),
            ),
            JobBinding::new(
                JobName::SidecarCheck,
                QueueName::Sidecar,
                "handleSidecarCheck",
                logged(self.name()),
            ),
        ]
    }
}

pub struct PersonService;

impl JobProvider for PersonService {
    fn name(&self) -> &'static str {
        "PersonService"
    }

    fn bindings(&self) -> Vec<JobBinding> {
        vec![
            JobBinding::new(
                JobName::FacialRecognition,
                QueueName::FacialRecognition,
                "handleRecognizeFaces",
                logged(self.name()),
            ),
            JobBinding::new(
                JobName::FacialRecognitionQueueAll,
                QueueName::FacialRecognition,
                "handleQueueRecognizeFaces",
                logged(self.name()),
            ),
        ]
    }
}

pub struct NotificationService;

impl JobProvider for NotificationService {
    fn name(&self) -> &'static str {
        "NotificationService"
    }

    fn bindings(&self) -> Vec<JobBinding> {
        vec![
            JobBinding::new(
                JobName::NotifyAlbumUpdate,
                QueueName::Notification,
                "handleAlbumUpdate",
                logged(self.name()),
            ),
            JobBinding::new(
                JobName::NotifyAlbumInvite,
                QueueName::Notification,
                "handleAlbumInvite",
                logged(self.name()),
            ),
        ]
    }
}

pub struct StorageTemplateService;

impl JobProvider for StorageTemplateService {
    fn name(&self) -> &'static str {
        "StorageTemplateService"
    }

    fn bindings(&self) -> Vec<JobBinding> {
        vec![
            JobBinding::new(
                JobName::StorageTemplateMigration,
                QueueName::StorageTemplateMigration,
                "handleMigration",
                logged(self.name()),
            ),
            JobBinding::new(
                JobName::StorageTemplateMigrationSingle,
                QueueName::StorageTemplateMigration,
                "handleMigrationSingle",
                logged(self.name()),
            ),
        ]
    }
}

/// Periodic deletion sweeps
pub struct HousekeepingService;

impl JobProvider for HousekeepingService {
    fn name(&self) -> &'static str {
        "HousekeepingService"
    }

    fn bindings(&self) -> Vec<JobBinding> {
        vec![
            JobBinding::new(
                JobName::AssetDeleteCheck,
                QueueName::BackgroundTask,
                "handleAssetDeleteCheck",
                logged(self.name()),
            ),
            JobBinding::new(
                JobName::UserDeleteCheck,
                QueueName::BackgroundTask,
                "handleUserDeleteCheck",
                logged(self.name()),
            ),
        ]
    }
}
