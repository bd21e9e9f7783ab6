// Event Bus Port
// Workers hand received jobs to the execution pipeline through this seam.

use crate::domain::{QueueName, QueuedJob};
use crate::error::Result;
use async_trait::async_trait;

/// Events emitted by the orchestration layer
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// A worker claimed a job and wants it executed
    JobStart { queue: QueueName, job: QueuedJob },
}

/// Event bus interface
///
/// `emit` resolves once the listener has finished with the event, so a
/// worker awaiting it holds its concurrency slot for the whole execution.
/// An error marks the job as failed in the engine.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn emit(&self, event: JobEvent) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every event, holds each one for a fixed time and tracks how
    /// many were in flight at once
    pub struct RecordingEventBus {
        hold: Duration,
        events: Mutex<Vec<JobEvent>>,
        failing: Mutex<HashSet<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl RecordingEventBus {
        pub fn new(hold: Duration) -> Self {
            Self {
                hold,
                events: Mutex::new(Vec::new()),
                failing: Mutex::new(HashSet::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        /// Fail every job with the given name
        pub fn fail_job(&self, name: impl Into<String>) {
            self.failing.lock().unwrap().insert(name.into());
        }

        pub fn events(&self) -> Vec<JobEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn started_ids(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .map(|JobEvent::JobStart { job, .. }| job.id)
                .collect()
        }

        pub fn in_flight(&self) -> usize {
            self.in_flight.load(Ordering::SeqCst)
        }

        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventBus for RecordingEventBus {
        async fn emit(&self, event: JobEvent) -> Result<()> {
            let JobEvent::JobStart { job, .. } = &event;
            let name = job.name.clone();
            self.events.lock().unwrap().push(event);

            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(self.hold).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.lock().unwrap().contains(&name) {
                return Err(AppError::Execution(format!("{} failed", name)));
            }
            Ok(())
        }
    }
}
