// Queue Domain Model

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical queue a job is routed to. One worker drains each queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    ThumbnailGeneration,
    MetadataExtraction,
    FacialRecognition,
    Sidecar,
    Notification,
    StorageTemplateMigration,
    BackgroundTask,
}

impl QueueName {
    /// Every declared queue, in a stable order
    pub const ALL: [QueueName; 7] = [
        QueueName::ThumbnailGeneration,
        QueueName::MetadataExtraction,
        QueueName::FacialRecognition,
        QueueName::Sidecar,
        QueueName::Notification,
        QueueName::StorageTemplateMigration,
        QueueName::BackgroundTask,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::ThumbnailGeneration => "thumbnail_generation",
            QueueName::MetadataExtraction => "metadata_extraction",
            QueueName::FacialRecognition => "facial_recognition",
            QueueName::Sidecar => "sidecar",
            QueueName::Notification => "notification",
            QueueName::StorageTemplateMigration => "storage_template_migration",
            QueueName::BackgroundTask => "background_task",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QueueName::ALL
            .into_iter()
            .find(|queue| queue.as_str() == s)
            .ok_or_else(|| DomainError::UnknownQueueName(s.to_string()))
    }
}

/// Live queue state, queried on demand and never cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    /// At least one job is currently being processed
    pub is_active: bool,
    /// Intake is disabled
    pub is_paused: bool,
}

/// Observability snapshot of a queue. Not used for control decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
    pub waiting: u64,
    pub paused: u64,
}

/// Terminal bucket purged by `clean`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanBucket {
    Completed,
    Failed,
}

impl CleanBucket {
    /// Engine state holding the jobs of this bucket
    pub fn state(&self) -> EngineJobState {
        match self {
            CleanBucket::Completed => EngineJobState::Completed,
            CleanBucket::Failed => EngineJobState::Failed,
        }
    }
}

impl FromStr for CleanBucket {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(CleanBucket::Completed),
            "failed" => Ok(CleanBucket::Failed),
            other => Err(DomainError::InvalidJobState(format!(
                "{} is not a cleanable bucket",
                other
            ))),
        }
    }
}

/// Lifecycle of a job inside the durable queue engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineJobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl EngineJobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineJobState::Waiting => "WAITING",
            EngineJobState::Delayed => "DELAYED",
            EngineJobState::Active => "ACTIVE",
            EngineJobState::Completed => "COMPLETED",
            EngineJobState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for EngineJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineJobState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WAITING" => Ok(EngineJobState::Waiting),
            "DELAYED" => Ok(EngineJobState::Delayed),
            "ACTIVE" => Ok(EngineJobState::Active),
            "COMPLETED" => Ok(EngineJobState::Completed),
            "FAILED" => Ok(EngineJobState::Failed),
            other => Err(DomainError::InvalidJobState(other.to_string())),
        }
    }
}
