// Handler Registry - binds every job type to exactly one handler and queue

use crate::domain::{JobItem, JobName, JobStatus, QueueName};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error};

/// Domain code that performs one job type
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: JobItem) -> Result<JobStatus>;
}

/// Adapter turning an async closure into a [`JobHandler`]
pub struct FnHandler<F>(F);

/// Wrap an async closure as a handler
///
/// ```text
/// let handler = handler_fn(|job| async move { Ok(JobStatus::Success) });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn JobHandler>
where
    F: Fn(JobItem) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<JobStatus>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(JobItem) -> Fut + Send + Sync,
    Fut: Future<Output = Result<JobStatus>> + Send,
{
    async fn handle(&self, job: JobItem) -> Result<JobStatus> {
        (self.0)(job).await
    }
}

/// One job binding declared by a provider
pub struct JobBinding {
    pub job_name: JobName,
    pub queue_name: QueueName,
    /// Name of the operation inside the provider, used for diagnostics
    pub method: &'static str,
    pub handler: Arc<dyn JobHandler>,
}

impl JobBinding {
    pub fn new(
        job_name: JobName,
        queue_name: QueueName,
        method: &'static str,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        Self {
            job_name,
            queue_name,
            method,
            handler,
        }
    }
}

/// A unit of domain code exposing job handlers (a service)
pub trait JobProvider: Send + Sync {
    /// Provider name, e.g. "MediaService"
    fn name(&self) -> &'static str;

    /// The job bindings this provider implements
    fn bindings(&self) -> Vec<JobBinding>;
}

/// Registered binding of a job type to code
#[derive(Clone)]
pub struct HandlerEntry {
    pub job_name: JobName,
    pub queue_name: QueueName,
    pub handler: Arc<dyn JobHandler>,
    /// "Provider.method"
    pub label: String,
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("job_name", &self.job_name)
            .field("queue_name", &self.queue_name)
            .field("label", &self.label)
            .finish()
    }
}

/// Job name → handler table. Built once at startup, read-only afterwards.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobName, HandlerEntry>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every provider and check that all job types are covered
    pub fn setup(providers: &[Arc<dyn JobProvider>]) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(providers)?;
        registry.validate_coverage(&JobName::ALL)?;
        Ok(registry)
    }

    /// Bind the handlers declared by each provider
    ///
    /// # Errors
    /// - AppError::Startup if a job type is already bound
    pub fn register(&mut self, providers: &[Arc<dyn JobProvider>]) -> Result<()> {
        for provider in providers {
            for binding in provider.bindings() {
                let label = format!("{}.{}", provider.name(), binding.method);
                self.bind(binding, label)?;
            }
        }
        Ok(())
    }

    fn bind(&mut self, binding: JobBinding, label: String) -> Result<()> {
        if let Some(existing) = self.handlers.get(&binding.job_name) {
            let message = format!("Failed to add job handler for {}", label);
            error!(
                job = %binding.job_name,
                handler = %label,
                existing = %existing.label,
                "{}. JobName::{} is already handled by {}",
                message,
                binding.job_name,
                existing.label
            );
            return Err(AppError::Startup(format!(
                "{}: JobName::{} is already handled by {}",
                message, binding.job_name, existing.label
            )));
        }

        debug!(job = %binding.job_name, handler = %label, "Added job handler");
        self.handlers.insert(
            binding.job_name,
            HandlerEntry {
                job_name: binding.job_name,
                queue_name: binding.queue_name,
                handler: binding.handler,
                label,
            },
        );
        Ok(())
    }

    /// Fail on the first job type without a handler
    pub fn validate_coverage(&self, all_job_names: &[JobName]) -> Result<()> {
        for name in all_job_names {
            if !self.handlers.contains_key(name) {
                let message = format!("Failed to find job handler for JobName::{}", name);
                error!(
                    job = %name,
                    "{}. Make sure a registered provider declares a binding for it",
                    message
                );
                return Err(AppError::Startup(message));
            }
        }
        Ok(())
    }

    pub fn lookup(&self, name: JobName) -> Option<&HandlerEntry> {
        self.handlers.get(&name)
    }

    /// Queue a job type is routed to
    pub fn queue_for(&self, name: JobName) -> Result<QueueName> {
        self.lookup(name)
            .map(|entry| entry.queue_name)
            .ok_or_else(|| AppError::NotFound(format!("No handler registered for job {}", name)))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
