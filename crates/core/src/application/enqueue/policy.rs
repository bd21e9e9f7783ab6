// Per-job submission policy: job name → options rule

use crate::domain::{JobItem, JobName, JobOptions};
use std::collections::HashMap;
use std::sync::Arc;

/// Pure function computing submission options for one item
pub type OptionsRule = Arc<dyn Fn(&JobItem) -> JobOptions + Send + Sync>;

/// Strategy map from job name to its options rule. Names without a rule
/// are submitted with default options.
#[derive(Clone)]
pub struct JobPolicy {
    rules: HashMap<JobName, OptionsRule>,
}

impl JobPolicy {
    /// Policy without any rule
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Add or replace the rule for a job name
    pub fn with_rule<F>(mut self, name: JobName, rule: F) -> Self
    where
        F: Fn(&JobItem) -> JobOptions + Send + Sync + 'static,
    {
        self.rules.insert(name, Arc::new(rule));
        self
    }

    pub fn options_for(&self, item: &JobItem) -> JobOptions {
        self.rules
            .get(&item.name())
            .map(|rule| rule(item))
            .unwrap_or_default()
    }
}

impl Default for JobPolicy {
    fn default() -> Self {
        Self::empty()
            .with_rule(JobName::NotifyAlbumUpdate, notify_album_update)
            .with_rule(JobName::StorageTemplateMigrationSingle, single_migration)
            .with_rule(JobName::PersonGenerateThumbnail, |_| JobOptions {
                priority: Some(1),
                ..Default::default()
            })
            .with_rule(JobName::FacialRecognitionQueueAll, |_| JobOptions {
                job_id: Some(JobName::FacialRecognitionQueueAll.to_string()),
                ..Default::default()
            })
    }
}

// Coalesce repeat notifications to the same recipient for the same album
fn notify_album_update(item: &JobItem) -> JobOptions {
    match item {
        JobItem::NotifyAlbumUpdate(job) => JobOptions {
            job_id: Some(format!("{}/{}", job.id, job.recipient_id)),
            delay_ms: job.delay,
            priority: None,
        },
        _ => JobOptions::default(),
    }
}

// At most one pending migration per asset
fn single_migration(item: &JobItem) -> JobOptions {
    match item {
        JobItem::StorageTemplateMigrationSingle(job) => JobOptions {
            job_id: Some(job.id.to_string()),
            ..Default::default()
        },
        _ => JobOptions::default(),
    }
}
