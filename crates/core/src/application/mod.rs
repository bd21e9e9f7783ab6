// Application Layer - Registry, dispatch, enqueue, admin and workers

pub mod admin;
pub mod barrier;
pub mod dispatcher;
pub mod enqueue;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod worker;

// Re-exports
pub use admin::QueueAdmin;
pub use barrier::CompletionBarrier;
pub use dispatcher::Dispatcher;
pub use enqueue::{BatchEnqueuer, JobPolicy};
pub use orchestrator::{JobOrchestrator, OrchestratorConfig};
pub use pipeline::JobPipeline;
pub use registry::{handler_fn, HandlerEntry, HandlerRegistry, JobBinding, JobHandler, JobProvider};
pub use worker::{shutdown_channel, QueueWorker, ShutdownSender, ShutdownToken, WorkerPool};
