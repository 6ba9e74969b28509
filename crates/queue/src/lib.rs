//! Pipeline bus: durable channels with leases, ack/nack and dead-lettering,
//! plus the generic stage consumer that drives each pipeline stage.

pub mod backoff;
pub mod bus;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod pg;
pub mod shutdown;
pub mod stage;

pub use backoff::Backoff;
pub use bus::{Bus, Consumer, Publisher};
pub use envelope::{Delivery, Envelope};
pub use error::{QueueError, StageError};
pub use memory::MemoryBus;
pub use pg::PgBus;
pub use shutdown::{os_signal, shutdown_channel, trigger_on_signal, Shutdown, ShutdownTrigger};
pub use stage::{Outcome, StageConsumer, StageConsumerBuilder, StageHandler};
