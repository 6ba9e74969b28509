use std::fmt;

use thiserror::Error;

/// How a failure should be treated by whoever observes it.
///
/// Collaborators classify their own errors so that the stage consumer can
/// decide between redelivery and dead-lettering without inspecting concrete
/// error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Expected to clear on its own (network blip, model server restart).
    Transient,
    /// Retrying the same input will fail the same way.
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Fatal => write!(f, "fatal"),
        }
    }
}

/// Errors that know whether they are worth retrying.
pub trait Classify {
    fn kind(&self) -> ErrorKind;

    fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// Rejected job parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("interval must be a positive number of seconds, got {0}")]
    InvalidInterval(f64),

    #[error("total duration must be a positive number of seconds, got {0}")]
    InvalidDuration(f64),

    #[error("target id must not be empty")]
    EmptyTarget,

    #[error("recipient must not be empty")]
    EmptyRecipient,
}

impl Classify for JobError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Fatal
    }
}
