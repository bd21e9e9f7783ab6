// Central Error Type for the Orchestration Layer

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    /// Fatal misconfiguration detected while wiring handlers or workers.
    /// The process must not continue past this.
    #[error("Startup error: {0}")]
    Startup(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Failure reported by the durable queue engine
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The job is not in a state that allows the operation,
    /// e.g. removing or finishing while another worker moved it on
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A handler reported failure or raised an error while running a job
    #[error("Execution error: {0}")]
    Execution(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in infra-sqlite crate
// by converting to AppError::Database(String)
