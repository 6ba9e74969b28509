use std::sync::Arc;

use vibesense_core::MonitoringJob;

use crate::error::TriggerError;

/// Starts a fetch-and-dispatch run without waiting for it.
///
/// `trigger` must return quickly: the scheduler calls it from its tick loop.
/// An `Err` means the run was not started.
pub trait FetchTrigger: Send + Sync {
    fn trigger(&self, job: &MonitoringJob) -> Result<(), TriggerError>;
}

impl<T: FetchTrigger + ?Sized> FetchTrigger for Arc<T> {
    fn trigger(&self, job: &MonitoringJob) -> Result<(), TriggerError> {
        (**self).trigger(job)
    }
}
