pub mod traits;
pub mod youtube;

pub use traits::{CommentFetcher, FetchError};
pub use youtube::YoutubeFetcher;
