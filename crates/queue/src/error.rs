//! Bus and stage error types.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;
use vibesense_core::{Classify, ErrorKind};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("message encode error: {0}")]
    Encode(String),

    #[error("message decode error: {0}")]
    Decode(String),

    /// The lease behind a receipt is gone: it expired and the message was
    /// handed to another consumer, or it was already settled.
    #[error("lease expired or unknown receipt: {0}")]
    LeaseExpired(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Classify for QueueError {
    fn kind(&self) -> ErrorKind {
        match self {
            QueueError::Connection(_) | QueueError::Database(_) | QueueError::LeaseExpired(_) => {
                ErrorKind::Transient
            }
            QueueError::Encode(_) | QueueError::Decode(_) => ErrorKind::Fatal,
        }
    }
}

/// Outcome of a failed stage handler, already classified.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("fatal: {0}")]
    Fatal(String),
}

impl StageError {
    /// Wrap any classified collaborator error, keeping its kind.
    pub fn classify<E: Classify + fmt::Display>(err: E) -> Self {
        match err.kind() {
            ErrorKind::Transient => StageError::Transient(err.to_string()),
            ErrorKind::Fatal => StageError::Fatal(err.to_string()),
        }
    }
}

impl Classify for StageError {
    fn kind(&self) -> ErrorKind {
        match self {
            StageError::Transient(_) => ErrorKind::Transient,
            StageError::Fatal(_) => ErrorKind::Fatal,
        }
    }
}
