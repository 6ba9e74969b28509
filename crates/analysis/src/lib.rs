//! Analysis and aggregation stages: the model-server client, interval
//! statistics, and the stage handlers for the `analysis` and `aggregation`
//! channels.

pub mod analyzer;
pub mod http;
pub mod stages;
pub mod stats;

pub use analyzer::{AnalysisError, Analyzer};
pub use http::HttpAnalyzer;
pub use stages::{batch_key, latest_aggregate, AggregationStage, AnalysisStage};
pub use stats::{aggregate, StatsError, Summary};
