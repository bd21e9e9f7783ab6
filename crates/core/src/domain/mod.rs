// Domain Layer - Job taxonomy, queues and engine-facing records

pub mod error;
pub mod job;
pub mod queue;

// Re-exports
pub use error::DomainError;
pub use job::{
    AlbumNotificationJob, EmptyJob, EntityJob, JobId, JobItem, JobName, JobOptions, JobRecord,
    JobStatus, Priority, QueueAllJob, QueuedJob,
};
pub use queue::{CleanBucket, EngineJobState, JobCounts, QueueName, QueueStatus};
