// Job Pipeline - executes JobStart events through the dispatcher

use crate::application::dispatcher::Dispatcher;
use crate::domain::JobStatus;
use crate::error::{AppError, Result};
use crate::port::{EventBus, JobEvent};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

/// In-process event bus listener running each started job to completion
pub struct JobPipeline {
    dispatcher: Arc<Dispatcher>,
}

impl JobPipeline {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl EventBus for JobPipeline {
    async fn emit(&self, event: JobEvent) -> Result<()> {
        let JobEvent::JobStart { queue, job } = event;
        let span = info_span!("job", queue = %queue, job_id = %job.id, job = %job.name);

        async move {
            let started = Instant::now();
            let result = self.dispatcher.run(&job.record()).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(JobStatus::Success) => {
                    info!(elapsed_ms, "Job completed");
                    Ok(())
                }
                Ok(JobStatus::Skipped) => {
                    info!(elapsed_ms, "Job skipped");
                    Ok(())
                }
                Ok(JobStatus::Failed) => {
                    warn!(elapsed_ms, "Job reported failure");
                    Err(AppError::Execution(format!(
                        "{} reported failure",
                        job.name
                    )))
                }
                Err(e) => {
                    error!(elapsed_ms, error = %e, "Job errored");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}
