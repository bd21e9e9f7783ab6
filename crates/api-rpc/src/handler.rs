//! RPC Method Handlers
//!
//! Thin adapters from JSON-RPC params to the job orchestrator.

use crate::error::{timeout_error, to_rpc_error};
use crate::types::{
    CleanRequest, CleanResponse, ConcurrencyRequest, ConcurrencyResponse, CountsResponse,
    DrainResponse, EnqueueRequest, EnqueueResponse, QueueAckResponse, QueueRequest,
    QueueStatusResponse, RemoveJobRequest, RemoveJobResponse, WaitRequest, WaitResponse,
};
use conveyor_core::application::JobOrchestrator;
use conveyor_core::domain::{CleanBucket, JobItem, JobName, JobRecord, QueueName};
use conveyor_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

type RpcResult<T> = Result<T, ErrorObjectOwned>;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    orchestrator: Arc<JobOrchestrator>,
}

impl RpcHandler {
    pub fn new(orchestrator: Arc<JobOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// queue.status.v1
    pub async fn status(&self, params: QueueRequest) -> RpcResult<QueueStatusResponse> {
        let queue = parse_queue(&params.queue)?;
        let status = self
            .orchestrator
            .status(queue)
            .await
            .map_err(to_rpc_error)?;

        Ok(QueueStatusResponse {
            queue: params.queue,
            is_active: status.is_active,
            is_paused: status.is_paused,
            concurrency: self.orchestrator.concurrency(queue),
        })
    }

    /// queue.pause.v1
    pub async fn pause(&self, params: QueueRequest) -> RpcResult<QueueAckResponse> {
        let queue = parse_queue(&params.queue)?;
        self.orchestrator.pause(queue).await.map_err(to_rpc_error)?;

        Ok(QueueAckResponse {
            queue: params.queue,
            is_paused: true,
        })
    }

    /// queue.resume.v1
    pub async fn resume(&self, params: QueueRequest) -> RpcResult<QueueAckResponse> {
        let queue = parse_queue(&params.queue)?;
        self.orchestrator.resume(queue).await.map_err(to_rpc_error)?;

        Ok(QueueAckResponse {
            queue: params.queue,
            is_paused: false,
        })
    }

    /// queue.drain.v1
    pub async fn drain(&self, params: QueueRequest) -> RpcResult<DrainResponse> {
        let queue = parse_queue(&params.queue)?;
        let removed = self.orchestrator.drain(queue).await.map_err(to_rpc_error)?;

        Ok(DrainResponse {
            queue: params.queue,
            removed,
        })
    }

    /// queue.clean.v1
    pub async fn clean(&self, params: CleanRequest) -> RpcResult<CleanResponse> {
        let queue = parse_queue(&params.queue)?;
        let bucket: CleanBucket = params
            .bucket
            .parse()
            .map_err(|e| to_rpc_error(AppError::Domain(e)))?;

        let removed = self
            .orchestrator
            .clean(queue, bucket)
            .await
            .map_err(to_rpc_error)?;

        Ok(CleanResponse {
            queue: params.queue,
            removed,
        })
    }

    /// queue.counts.v1
    pub async fn counts(&self, params: QueueRequest) -> RpcResult<CountsResponse> {
        let queue = parse_queue(&params.queue)?;
        let counts = self.orchestrator.counts(queue).await.map_err(to_rpc_error)?;

        Ok(CountsResponse {
            queue: params.queue,
            counts,
        })
    }

    /// queue.concurrency.v1
    pub async fn set_concurrency(
        &self,
        params: ConcurrencyRequest,
    ) -> RpcResult<ConcurrencyResponse> {
        let queue = parse_queue(&params.queue)?;
        self.orchestrator
            .set_concurrency(queue, params.concurrency)
            .map_err(to_rpc_error)?;

        Ok(ConcurrencyResponse {
            queue: params.queue,
            concurrency: params.concurrency,
        })
    }

    /// queue.wait.v1
    ///
    /// The barrier itself never times out; the deadline lives here.
    pub async fn wait(&self, params: WaitRequest) -> RpcResult<WaitResponse> {
        let queues: Vec<QueueName> = if params.queues.is_empty() {
            QueueName::ALL.to_vec()
        } else {
            params
                .queues
                .iter()
                .map(|q| parse_queue(q))
                .collect::<RpcResult<_>>()?
        };

        let started = Instant::now();
        tokio::time::timeout(
            Duration::from_millis(params.timeout_ms),
            self.orchestrator.wait_for_queue_completion(&queues),
        )
        .await
        .map_err(|_| timeout_error(params.timeout_ms))?
        .map_err(to_rpc_error)?;

        Ok(WaitResponse {
            queues: queues.iter().map(|q| q.to_string()).collect(),
            waited_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// jobs.enqueue.v1
    pub async fn enqueue(&self, params: EnqueueRequest) -> RpcResult<EnqueueResponse> {
        let items = params
            .jobs
            .into_iter()
            .map(|job| JobRecord::new(job.name, job.data).to_item())
            .collect::<Result<Vec<JobItem>, _>>()
            .map_err(|e| to_rpc_error(AppError::Domain(e)))?;

        let enqueued = items.len();
        self.orchestrator
            .queue_all(items)
            .await
            .map_err(to_rpc_error)?;

        info!(enqueued, "Jobs enqueued over RPC");
        Ok(EnqueueResponse { enqueued })
    }

    /// jobs.remove.v1
    pub async fn remove_job(&self, params: RemoveJobRequest) -> RpcResult<RemoveJobResponse> {
        let name: JobName = params
            .name
            .parse()
            .map_err(|e| to_rpc_error(AppError::Domain(e)))?;

        let removed = self
            .orchestrator
            .remove_job(name, &params.job_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(RemoveJobResponse {
            job_id: params.job_id,
            removed,
        })
    }
}

fn parse_queue(name: &str) -> RpcResult<QueueName> {
    name.parse()
        .map_err(|e| to_rpc_error(AppError::Domain(e)))
}
