// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid export state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Unknown entity kind: {0}")]
    UnknownEntityKind(String),

    #[error("Invalid task group: {0}")]
    InvalidTaskGroup(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
