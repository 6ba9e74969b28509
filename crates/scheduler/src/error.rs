use thiserror::Error;
use vibesense_core::{Classify, ErrorKind, JobId};
use vibesense_store::StoreError;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("job store: {0}")]
    Store(#[from] StoreError),

    #[error("timer table: {0}")]
    Timers(#[from] sqlx::Error),
}

impl Classify for SchedulerError {
    fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::Store(e) => e.kind(),
            SchedulerError::Timers(_) => ErrorKind::Transient,
        }
    }
}

/// Synchronous refusal from a fetch trigger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// No capacity to start another fetch right now.
    #[error("fetch capacity saturated")]
    Saturated,

    /// A fetch for this job is still running; the window is skipped.
    #[error("fetch already in flight for job {0}")]
    InFlight(JobId),

    #[error("fetch trigger is shut down")]
    Closed,
}
