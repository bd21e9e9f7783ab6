// Port Layer - Interfaces for external collaborators

pub mod event_bus;
pub mod id_provider;
pub mod queue_engine;
pub mod time_provider;

// Re-exports
pub use event_bus::{EventBus, JobEvent};
pub use id_provider::IdProvider;
pub use queue_engine::{JobOutcome, NewJob, QueueEngine};
pub use time_provider::TimeProvider;
