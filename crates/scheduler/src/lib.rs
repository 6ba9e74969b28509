//! Dynamic scheduler for monitoring jobs.

pub mod entry;
pub mod error;
pub mod pg;
pub mod scheduler;
pub mod store;
pub mod trigger;

pub use entry::TimerEntry;
pub use error::{SchedulerError, TriggerError};
pub use pg::PgSchedulerStore;
pub use scheduler::{DynamicScheduler, RefreshReport, TickReport};
pub use store::{MemorySchedulerStore, SchedulerStore};
pub use trigger::FetchTrigger;
