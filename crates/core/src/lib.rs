pub mod clock;
pub mod config;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod result;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::*;
pub use job::*;
pub use pipeline::{
    AggregateReport, AnalyzedBatch, BatchItem, CommentBatch, PipelineMessage,
};
pub use result::*;
