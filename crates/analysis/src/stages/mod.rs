pub mod aggregation;
pub mod analysis;

pub use aggregation::{batch_key, latest_aggregate, AggregationStage};
pub use analysis::AnalysisStage;
