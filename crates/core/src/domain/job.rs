// Job Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::queue::{EngineJobState, QueueName};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Engine-assigned (or dedup-supplied) job identifier
pub type JobId = String;

/// Priority (higher number = higher priority, 0 = normal)
pub type Priority = i32;

/// Known job types. Every variant must have exactly one handler at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobName {
    AssetGenerateThumbnails,
    PersonGenerateThumbnail,
    AssetExtractMetadata,
    SidecarCheck,
    FacialRecognition,
    FacialRecognitionQueueAll,
    NotifyAlbumUpdate,
    NotifyAlbumInvite,
    StorageTemplateMigration,
    StorageTemplateMigrationSingle,
    AssetDeleteCheck,
    UserDeleteCheck,
}

impl JobName {
    /// Every declared job type, in a stable order
    pub const ALL: [JobName; 12] = [
        JobName::AssetGenerateThumbnails,
        JobName::PersonGenerateThumbnail,
        JobName::AssetExtractMetadata,
        JobName::SidecarCheck,
        JobName::FacialRecognition,
        JobName::FacialRecognitionQueueAll,
        JobName::NotifyAlbumUpdate,
        JobName::NotifyAlbumInvite,
        JobName::StorageTemplateMigration,
        JobName::StorageTemplateMigrationSingle,
        JobName::AssetDeleteCheck,
        JobName::UserDeleteCheck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobName::AssetGenerateThumbnails => "AssetGenerateThumbnails",
            JobName::PersonGenerateThumbnail => "PersonGenerateThumbnail",
            JobName::AssetExtractMetadata => "AssetExtractMetadata",
            JobName::SidecarCheck => "SidecarCheck",
            JobName::FacialRecognition => "FacialRecognition",
            JobName::FacialRecognitionQueueAll => "FacialRecognitionQueueAll",
            JobName::NotifyAlbumUpdate => "NotifyAlbumUpdate",
            JobName::NotifyAlbumInvite => "NotifyAlbumInvite",
            JobName::StorageTemplateMigration => "StorageTemplateMigration",
            JobName::StorageTemplateMigrationSingle => "StorageTemplateMigrationSingle",
            JobName::AssetDeleteCheck => "AssetDeleteCheck",
            JobName::UserDeleteCheck => "UserDeleteCheck",
        }
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        JobName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| DomainError::UnknownJobName(s.to_string()))
    }
}

/// Outcome of dispatching one job. Never persisted by this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Success => write!(f, "success"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Submission hints handed to the queue engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    /// Dedup key. The engine coalesces submissions sharing it while an
    /// earlier one is still waiting, delayed or active.
    pub job_id: Option<JobId>,
    /// Milliseconds before the job becomes eligible
    pub delay_ms: Option<u64>,
    pub priority: Option<Priority>,
}

impl JobOptions {
    /// Options carrying a dedup key must bypass bulk submission
    pub fn is_deduplicated(&self) -> bool {
        self.job_id.is_some()
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Payload for jobs targeting a single entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityJob {
    pub id: Uuid,
}

/// Payload for sweep jobs that fan out over every entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueAllJob {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
}

/// Payload for album notifications sent to one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumNotificationJob {
    pub id: Uuid,
    pub recipient_id: Uuid,
    /// Delay in milliseconds (only honored for album updates)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyJob {}

/// A typed unit of work: one variant per [`JobName`], each with its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobItem {
    AssetGenerateThumbnails(EntityJob),
    PersonGenerateThumbnail(EntityJob),
    AssetExtractMetadata(EntityJob),
    SidecarCheck(EntityJob),
    FacialRecognition(EntityJob),
    FacialRecognitionQueueAll(QueueAllJob),
    NotifyAlbumUpdate(AlbumNotificationJob),
    NotifyAlbumInvite(AlbumNotificationJob),
    StorageTemplateMigration(EmptyJob),
    StorageTemplateMigrationSingle(EntityJob),
    AssetDeleteCheck(EmptyJob),
    UserDeleteCheck(EmptyJob),
}

impl JobItem {
    pub fn name(&self) -> JobName {
        match self {
            JobItem::AssetGenerateThumbnails(_) => JobName::AssetGenerateThumbnails,
            JobItem::PersonGenerateThumbnail(_) => JobName::PersonGenerateThumbnail,
            JobItem::AssetExtractMetadata(_) => JobName::AssetExtractMetadata,
            JobItem::SidecarCheck(_) => JobName::SidecarCheck,
            JobItem::FacialRecognition(_) => JobName::FacialRecognition,
            JobItem::FacialRecognitionQueueAll(_) => JobName::FacialRecognitionQueueAll,
            JobItem::NotifyAlbumUpdate(_) => JobName::NotifyAlbumUpdate,
            JobItem::NotifyAlbumInvite(_) => JobName::NotifyAlbumInvite,
            JobItem::StorageTemplateMigration(_) => JobName::StorageTemplateMigration,
            JobItem::StorageTemplateMigrationSingle(_) => JobName::StorageTemplateMigrationSingle,
            JobItem::AssetDeleteCheck(_) => JobName::AssetDeleteCheck,
            JobItem::UserDeleteCheck(_) => JobName::UserDeleteCheck,
        }
    }

    /// Payload as the JSON value stored by the engine
    pub fn data(&self) -> Result<serde_json::Value> {
        let value = match self {
            JobItem::AssetGenerateThumbnails(job)
            | JobItem::PersonGenerateThumbnail(job)
            | JobItem::AssetExtractMetadata(job)
            | JobItem::SidecarCheck(job)
            | JobItem::FacialRecognition(job)
            | JobItem::StorageTemplateMigrationSingle(job) => serde_json::to_value(job),
            JobItem::FacialRecognitionQueueAll(job) => serde_json::to_value(job),
            JobItem::NotifyAlbumUpdate(job) | JobItem::NotifyAlbumInvite(job) => {
                serde_json::to_value(job)
            }
            JobItem::StorageTemplateMigration(job)
            | JobItem::AssetDeleteCheck(job)
            | JobItem::UserDeleteCheck(job) => serde_json::to_value(job),
        };

        value.map_err(|e| DomainError::InvalidPayload {
            name: self.name().to_string(),
            reason: e.to_string(),
        })
    }

    /// Decode a typed payload for a known job name
    pub fn decode(name: JobName, data: &serde_json::Value) -> Result<JobItem> {
        let item = match name {
            JobName::AssetGenerateThumbnails => {
                JobItem::AssetGenerateThumbnails(payload(name, data)?)
            }
            JobName::PersonGenerateThumbnail => {
                JobItem::PersonGenerateThumbnail(payload(name, data)?)
            }
            JobName::AssetExtractMetadata => JobItem::AssetExtractMetadata(payload(name, data)?),
            JobName::SidecarCheck => JobItem::SidecarCheck(payload(name, data)?),
            JobName::FacialRecognition => JobItem::FacialRecognition(payload(name, data)?),
            JobName::FacialRecognitionQueueAll => {
                JobItem::FacialRecognitionQueueAll(payload(name, data)?)
            }
            JobName::NotifyAlbumUpdate => JobItem::NotifyAlbumUpdate(payload(name, data)?),
            JobName::NotifyAlbumInvite => JobItem::NotifyAlbumInvite(payload(name, data)?),
            JobName::StorageTemplateMigration => {
                JobItem::StorageTemplateMigration(payload(name, data)?)
            }
            JobName::StorageTemplateMigrationSingle => {
                JobItem::StorageTemplateMigrationSingle(payload(name, data)?)
            }
            JobName::AssetDeleteCheck => JobItem::AssetDeleteCheck(payload(name, data)?),
            JobName::UserDeleteCheck => JobItem::UserDeleteCheck(payload(name, data)?),
        };
        Ok(item)
    }

    pub fn into_record(self) -> Result<JobRecord> {
        let data = self.data()?;
        Ok(JobRecord {
            name: self.name().to_string(),
            data,
        })
    }
}

// Missing data is treated as an empty object
fn payload<T: DeserializeOwned>(name: JobName, data: &serde_json::Value) -> Result<T> {
    let result = if data.is_null() {
        serde_json::from_value(serde_json::json!({}))
    } else {
        T::deserialize(data)
    };

    result.map_err(|e| DomainError::InvalidPayload {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Untyped job as it travels through the engine. The name may belong to a
/// job taxonomy that no longer exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl JobRecord {
    pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Typed view of this record
    pub fn to_item(&self) -> Result<JobItem> {
        let name: JobName = self.name.parse()?;
        JobItem::decode(name, &self.data)
    }
}

impl TryFrom<JobRecord> for JobItem {
    type Error = DomainError;

    fn try_from(record: JobRecord) -> Result<Self> {
        record.to_item()
    }
}

/// A job held by the queue engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: JobId,
    pub queue: QueueName,
    pub name: String,
    pub data: serde_json::Value,
    pub priority: Priority,
    pub state: EngineJobState,

    pub created_at: i64, // epoch ms
    pub run_at: i64,     // epoch ms, later than created_at when delayed
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub failed_reason: Option<String>,
}

impl QueuedJob {
    pub fn record(&self) -> JobRecord {
        JobRecord::new(self.name.clone(), self.data.clone())
    }
}
