use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use vibesense_core::{Classify, Comment, ErrorKind};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("fetcher not configured: {0}")]
    Config(String),
}

impl Classify for FetchError {
    fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Http(_) => ErrorKind::Transient,
            FetchError::Api { status, .. } if *status == 429 || *status >= 500 => {
                ErrorKind::Transient
            }
            FetchError::Api { .. } | FetchError::Parse(_) | FetchError::Config(_) => {
                ErrorKind::Fatal
            }
        }
    }
}

/// Transport to the content platform.
#[async_trait]
pub trait CommentFetcher: Send + Sync {
    /// Comments on `target_id`, at least all of those published after
    /// `since`. May include older ones; callers filter strictly.
    /// Nothing new is an empty vec, not an error.
    async fn fetch_comments(
        &self,
        target_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Comment>, FetchError>;
}
