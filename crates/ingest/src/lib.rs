//! Comment ingestion: platform fetch, text preprocessing, and the
//! fetch-and-dispatch stage fired by the scheduler.

pub mod dispatch;
pub mod fetch;
pub mod preprocess;
pub mod trigger;

pub use dispatch::{select_new, DispatchError, DispatchOutcome, FetchDispatcher};
pub use fetch::{CommentFetcher, FetchError, YoutubeFetcher};
pub use preprocess::preprocess;
pub use trigger::SpawnTrigger;
