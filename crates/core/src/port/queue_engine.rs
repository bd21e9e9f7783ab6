// Queue Engine Port (Interface)
// The durable queue engine owns atomicity: dedup coalescing, claim exclusivity
// and concurrency bounds are its guarantees, not the orchestrator's.

use crate::domain::{
    CleanBucket, JobCounts, JobId, JobOptions, QueueName, QueuedJob,
};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A job submission as handed to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub name: String,
    pub data: serde_json::Value,
    pub options: JobOptions,
}

/// Final outcome reported back to the engine for a claimed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(String),
}

/// Durable queue engine interface
#[async_trait]
pub trait QueueEngine: Send + Sync {
    /// Add a single job. A job whose `options.job_id` is held by a waiting,
    /// delayed or active job on the queue is coalesced: nothing is inserted
    /// and the existing id is returned. Finished jobs release their id.
    ///
    /// A delay whose run time does not fit in epoch milliseconds is a
    /// validation error.
    async fn add(&self, queue: QueueName, job: NewJob) -> Result<JobId>;

    /// Add many jobs in one call
    async fn add_bulk(&self, queue: QueueName, jobs: Vec<NewJob>) -> Result<Vec<JobId>>;

    /// Stop handing out jobs from the queue. Active jobs are unaffected.
    async fn pause(&self, queue: QueueName) -> Result<()>;

    async fn resume(&self, queue: QueueName) -> Result<()>;

    async fn is_paused(&self, queue: QueueName) -> Result<bool>;

    /// Delete waiting jobs, including delayed jobs already due. Active and
    /// still-delayed jobs are kept.
    ///
    /// # Returns
    /// Number of jobs deleted
    async fn drain(&self, queue: QueueName) -> Result<u64>;

    /// Delete jobs of a terminal bucket that finished at least `grace_ms` ago,
    /// oldest first, at most `limit` of them
    ///
    /// # Returns
    /// Ids of the deleted jobs
    async fn clean(
        &self,
        queue: QueueName,
        bucket: CleanBucket,
        grace_ms: i64,
        limit: u32,
    ) -> Result<Vec<JobId>>;

    async fn job_counts(&self, queue: QueueName) -> Result<JobCounts>;

    /// Number of jobs currently being processed
    async fn active_count(&self, queue: QueueName) -> Result<u64>;

    /// The most recent job submitted under `id`
    async fn get_job(&self, queue: QueueName, id: &str) -> Result<Option<QueuedJob>>;

    /// Remove every job under `id`. Returns false when no such job exists.
    /// Fails with `Conflict` while one of them is active.
    async fn remove_job(&self, queue: QueueName, id: &str) -> Result<bool>;

    /// Atomically move the next eligible job to active and return it.
    /// Returns None while the queue is paused or nothing is due.
    async fn claim_next(&self, queue: QueueName) -> Result<Option<QueuedJob>>;

    /// Record the outcome of an active job. `Conflict` when the job is in
    /// any other state.
    async fn finish(&self, queue: QueueName, id: &str, outcome: JobOutcome) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::EngineJobState;
    use crate::error::AppError;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Mutating calls observed by the mock engine
    #[derive(Debug, Clone, PartialEq)]
    pub enum EngineCall {
        Add { queue: QueueName, job: NewJob },
        AddBulk { queue: QueueName, jobs: Vec<NewJob> },
        Pause(QueueName),
        Resume(QueueName),
        Drain(QueueName),
        Clean {
            queue: QueueName,
            bucket: CleanBucket,
            grace_ms: i64,
            limit: u32,
        },
        RemoveJob { queue: QueueName, id: JobId },
    }

    #[derive(Default)]
    struct State {
        jobs: Vec<QueuedJob>,
        paused: HashSet<QueueName>,
        calls: Vec<EngineCall>,
        next_id: u64,
        fail_submissions: bool,
    }

    /// In-memory queue engine that records every mutating call
    #[derive(Default)]
    pub struct MockQueueEngine {
        state: Mutex<State>,
    }

    impl MockQueueEngine {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every add/add_bulk call fail
        pub fn fail_submissions(&self, fail: bool) {
            self.state.lock().unwrap().fail_submissions = fail;
        }

        pub fn calls(&self) -> Vec<EngineCall> {
            self.state.lock().unwrap().calls.clone()
        }

        /// Only add/add_bulk calls
        pub fn submissions(&self) -> Vec<EngineCall> {
            self.calls()
                .into_iter()
                .filter(|c| matches!(c, EngineCall::Add { .. } | EngineCall::AddBulk { .. }))
                .collect()
        }

        pub fn jobs(&self, queue: QueueName) -> Vec<QueuedJob> {
            self.state
                .lock()
                .unwrap()
                .jobs
                .iter()
                .filter(|j| j.queue == queue)
                .cloned()
                .collect()
        }

        /// Force a job into a given state (test setup)
        pub fn set_state(&self, queue: QueueName, id: &str, state: EngineJobState) {
            let now = now_millis();
            let mut guard = self.state.lock().unwrap();
            if let Some(job) = guard
                .jobs
                .iter_mut()
                .rev()
                .find(|j| j.queue == queue && j.id == id)
            {
                job.state = state;
                if matches!(state, EngineJobState::Completed | EngineJobState::Failed) {
                    job.finished_at = Some(now);
                }
            }
        }

        fn insert(state: &mut State, queue: QueueName, job: NewJob) -> Result<JobId> {
            let now = now_millis();
            let delay = i64::try_from(job.options.delay_ms.unwrap_or(0))
                .ok()
                .filter(|delay| now.checked_add(*delay).is_some())
                .ok_or_else(|| AppError::Validation("Job delay out of range".to_string()))?;

            if let Some(existing) = job.options.job_id.as_ref().and_then(|id| {
                state
                    .jobs
                    .iter()
                    .find(|j| j.queue == queue && &j.id == id && is_pending(j))
                    .map(|j| j.id.clone())
            }) {
                return Ok(existing);
            }

            state.next_id += 1;
            let id = job
                .options
                .job_id
                .clone()
                .unwrap_or_else(|| state.next_id.to_string());

            state.jobs.push(QueuedJob {
                id: id.clone(),
                queue,
                name: job.name,
                data: job.data,
                priority: job.options.priority.unwrap_or(0),
                state: if delay > 0 {
                    EngineJobState::Delayed
                } else {
                    EngineJobState::Waiting
                },
                created_at: now,
                run_at: now + delay,
                started_at: None,
                finished_at: None,
                failed_reason: None,
            });
            Ok(id)
        }
    }

    fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn is_pending(job: &QueuedJob) -> bool {
        matches!(
            job.state,
            EngineJobState::Waiting | EngineJobState::Delayed | EngineJobState::Active
        )
    }

    fn is_due(job: &QueuedJob, now: i64) -> bool {
        match job.state {
            EngineJobState::Waiting => true,
            EngineJobState::Delayed => job.run_at <= now,
            _ => false,
        }
    }

    #[async_trait]
    impl QueueEngine for MockQueueEngine {
        async fn add(&self, queue: QueueName, job: NewJob) -> Result<JobId> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(EngineCall::Add {
                queue,
                job: job.clone(),
            });
            if state.fail_submissions {
                return Err(AppError::Database("mock engine rejected add".to_string()));
            }
            Self::insert(&mut state, queue, job)
        }

        async fn add_bulk(&self, queue: QueueName, jobs: Vec<NewJob>) -> Result<Vec<JobId>> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(EngineCall::AddBulk {
                queue,
                jobs: jobs.clone(),
            });
            if state.fail_submissions {
                return Err(AppError::Database(
                    "mock engine rejected add_bulk".to_string(),
                ));
            }
            // All or nothing, like a transaction
            let snapshot = (state.jobs.len(), state.next_id);
            let ids = jobs
                .into_iter()
                .map(|job| Self::insert(&mut state, queue, job))
                .collect::<Result<Vec<_>>>();
            if ids.is_err() {
                state.jobs.truncate(snapshot.0);
                state.next_id = snapshot.1;
            }
            ids
        }

        async fn pause(&self, queue: QueueName) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(EngineCall::Pause(queue));
            state.paused.insert(queue);
            Ok(())
        }

        async fn resume(&self, queue: QueueName) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(EngineCall::Resume(queue));
            state.paused.remove(&queue);
            Ok(())
        }

        async fn is_paused(&self, queue: QueueName) -> Result<bool> {
            Ok(self.state.lock().unwrap().paused.contains(&queue))
        }

        async fn drain(&self, queue: QueueName) -> Result<u64> {
            let now = now_millis();
            let mut state = self.state.lock().unwrap();
            state.calls.push(EngineCall::Drain(queue));
            let before = state.jobs.len();
            state.jobs.retain(|j| !(j.queue == queue && is_due(j, now)));
            Ok((before - state.jobs.len()) as u64)
        }

        async fn clean(
            &self,
            queue: QueueName,
            bucket: CleanBucket,
            grace_ms: i64,
            limit: u32,
        ) -> Result<Vec<JobId>> {
            let cutoff = now_millis() - grace_ms;
            let mut state = self.state.lock().unwrap();
            state.calls.push(EngineCall::Clean {
                queue,
                bucket,
                grace_ms,
                limit,
            });

            let mut candidates: Vec<(i64, JobId)> = state
                .jobs
                .iter()
                .filter(|j| j.queue == queue && j.state == bucket.state())
                .filter(|j| j.finished_at.map(|t| t <= cutoff).unwrap_or(false))
                .map(|j| (j.finished_at.unwrap_or(0), j.id.clone()))
                .collect();
            candidates.sort();
            candidates.truncate(limit as usize);

            let removed: Vec<JobId> = candidates.into_iter().map(|(_, id)| id).collect();
            state
                .jobs
                .retain(|j| !(j.queue == queue && removed.contains(&j.id)));
            Ok(removed)
        }

        async fn job_counts(&self, queue: QueueName) -> Result<JobCounts> {
            let now = now_millis();
            let state = self.state.lock().unwrap();
            let paused = state.paused.contains(&queue);
            let mut counts = JobCounts::default();
            for job in state.jobs.iter().filter(|j| j.queue == queue) {
                match job.state {
                    EngineJobState::Active => counts.active += 1,
                    EngineJobState::Completed => counts.completed += 1,
                    EngineJobState::Failed => counts.failed += 1,
                    EngineJobState::Delayed if job.run_at > now => counts.delayed += 1,
                    EngineJobState::Waiting | EngineJobState::Delayed => {
                        if paused {
                            counts.paused += 1;
                        } else {
                            counts.waiting += 1;
                        }
                    }
                }
            }
            Ok(counts)
        }

        async fn active_count(&self, queue: QueueName) -> Result<u64> {
            let state = self.state.lock().unwrap();
            Ok(state
                .jobs
                .iter()
                .filter(|j| j.queue == queue && j.state == EngineJobState::Active)
                .count() as u64)
        }

        async fn get_job(&self, queue: QueueName, id: &str) -> Result<Option<QueuedJob>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .jobs
                .iter()
                .rev()
                .find(|j| j.queue == queue && j.id == id)
                .cloned())
        }

        async fn remove_job(&self, queue: QueueName, id: &str) -> Result<bool> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(EngineCall::RemoveJob {
                queue,
                id: id.to_string(),
            });
            if state
                .jobs
                .iter()
                .any(|j| j.queue == queue && j.id == id && j.state == EngineJobState::Active)
            {
                return Err(AppError::Conflict(format!(
                    "Job {} is active and cannot be removed",
                    id
                )));
            }
            let before = state.jobs.len();
            state.jobs.retain(|j| !(j.queue == queue && j.id == id));
            Ok(state.jobs.len() < before)
        }

        async fn claim_next(&self, queue: QueueName) -> Result<Option<QueuedJob>> {
            let now = now_millis();
            let mut state = self.state.lock().unwrap();
            if state.paused.contains(&queue) {
                return Ok(None);
            }

            // Highest priority first, then insertion order
            let next = state
                .jobs
                .iter()
                .enumerate()
                .filter(|(_, j)| j.queue == queue && is_due(j, now))
                .max_by(|(ia, a), (ib, b)| a.priority.cmp(&b.priority).then(ib.cmp(ia)))
                .map(|(index, _)| index);

            Ok(next.map(|index| {
                let job = &mut state.jobs[index];
                job.state = EngineJobState::Active;
                job.started_at = Some(now);
                job.clone()
            }))
        }

        async fn finish(&self, queue: QueueName, id: &str, outcome: JobOutcome) -> Result<()> {
            let now = now_millis();
            let mut state = self.state.lock().unwrap();
            let Some(index) = state
                .jobs
                .iter()
                .position(|j| j.queue == queue && j.id == id && j.state == EngineJobState::Active)
            else {
                return Err(if state.jobs.iter().any(|j| j.queue == queue && j.id == id) {
                    AppError::Conflict(format!("Job {} is not active", id))
                } else {
                    AppError::NotFound(format!("Job {} not found", id))
                });
            };
            let job = &mut state.jobs[index];

            job.finished_at = Some(now);
            match outcome {
                JobOutcome::Completed => job.state = EngineJobState::Completed,
                JobOutcome::Failed(reason) => {
                    job.state = EngineJobState::Failed;
                    job.failed_reason = Some(reason);
                }
            }
            Ok(())
        }
    }
}
