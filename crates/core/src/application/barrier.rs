// Completion Barrier - wait until a set of queues has no active job

use crate::application::admin::QueueAdmin;
use crate::application::worker::constants::BARRIER_POLL_INTERVAL;
use crate::domain::QueueName;
use crate::error::Result;
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

pub struct CompletionBarrier {
    admin: Arc<QueueAdmin>,
    interval: Duration,
}

impl CompletionBarrier {
    pub fn new(admin: Arc<QueueAdmin>) -> Self {
        Self {
            admin,
            interval: BARRIER_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Resolve once one full polling round finds every queue idle
    ///
    /// Never times out; wrap with `tokio::time::timeout` to bound it.
    /// Status errors end the wait and are returned as is.
    pub async fn wait_for_queue_completion(&self, queues: &[QueueName]) -> Result<()> {
        let mut rounds = 0u64;
        loop {
            rounds += 1;
            let statuses =
                try_join_all(queues.iter().map(|queue| self.admin.status(*queue))).await?;

            let active: Vec<&str> = queues
                .iter()
                .zip(&statuses)
                .filter(|(_, status)| status.is_active)
                .map(|(queue, _)| queue.as_str())
                .collect();

            if active.is_empty() {
                debug!(rounds, "Queues idle");
                return Ok(());
            }

            info!(queues = %active.join(", "), "Waiting for active queues");
            sleep(self.interval).await;
        }
    }
}
