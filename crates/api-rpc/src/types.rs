//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results. Queue and job names
//! travel as strings and are validated by the handler.

use conveyor_core::domain::JobCounts;
use serde::{Deserialize, Serialize};

/// Params of every method keyed by a single queue
#[derive(Debug, Deserialize)]
pub struct QueueRequest {
    pub queue: String,
}

/// queue.status.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatusResponse {
    pub queue: String,
    pub is_active: bool,
    pub is_paused: bool,
    /// None when the worker pool has no worker for the queue
    pub concurrency: Option<usize>,
}

/// queue.pause.v1 / queue.resume.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueAckResponse {
    pub queue: String,
    pub is_paused: bool,
}

/// queue.drain.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainResponse {
    pub queue: String,
    pub removed: u64,
}

/// queue.clean.v1
#[derive(Debug, Deserialize)]
pub struct CleanRequest {
    pub queue: String,
    /// "completed" or "failed"
    pub bucket: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanResponse {
    pub queue: String,
    pub removed: Vec<String>,
}

/// queue.counts.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountsResponse {
    pub queue: String,
    pub counts: JobCounts,
}

/// queue.concurrency.v1
#[derive(Debug, Deserialize)]
pub struct ConcurrencyRequest {
    pub queue: String,
    pub concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyResponse {
    pub queue: String,
    pub concurrency: usize,
}

/// queue.wait.v1 - Block until the queues have no active job
#[derive(Debug, Deserialize)]
pub struct WaitRequest {
    /// Queues to watch. Empty means every queue.
    #[serde(default)]
    pub queues: Vec<String>,
    #[serde(default = "default_wait_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_wait_timeout_ms() -> u64 {
    60_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitResponse {
    pub queues: Vec<String>,
    pub waited_ms: u64,
}

/// One job of a jobs.enqueue.v1 batch
#[derive(Debug, Deserialize)]
pub struct EnqueueJob {
    pub name: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// jobs.enqueue.v1
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub jobs: Vec<EnqueueJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub enqueued: usize,
}

/// jobs.remove.v1
#[derive(Debug, Deserialize)]
pub struct RemoveJobRequest {
    pub name: String,
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveJobResponse {
    pub job_id: String,
    pub removed: bool,
}
