use async_trait::async_trait;
use vibesense_core::{AnalysisResult, Classify, ErrorKind};

/// Sentiment and summary inference for a batch of texts.
///
/// Implementations return exactly one result per input, in input order.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, texts: &[String]) -> Result<Vec<AnalysisResult>, AnalysisError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status}: {body}")]
    Api { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("expected {expected} results, got {got}")]
    Mismatch { expected: usize, got: usize },
}

impl Classify for AnalysisError {
    fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::Http(_) => ErrorKind::Transient,
            AnalysisError::Api { status, .. } if *status == 429 || *status >= 500 => {
                ErrorKind::Transient
            }
            AnalysisError::Api { .. } | AnalysisError::Parse(_) | AnalysisError::Mismatch { .. } => {
                ErrorKind::Fatal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retried() {
        let busy = AnalysisError::Api { status: 503, body: "loading model".into() };
        assert!(busy.is_transient());
        let bad = AnalysisError::Api { status: 422, body: "not a list".into() };
        assert_eq!(bad.kind(), ErrorKind::Fatal);
        assert_eq!(AnalysisError::Mismatch { expected: 3, got: 2 }.kind(), ErrorKind::Fatal);
    }
}
