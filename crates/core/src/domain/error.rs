// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Unknown job name: {0}")]
    UnknownJobName(String),

    #[error("Unknown queue name: {0}")]
    UnknownQueueName(String),

    #[error("Invalid payload for {name}: {reason}")]
    InvalidPayload { name: String, reason: String },

    #[error("Invalid job state: {0}")]
    InvalidJobState(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
