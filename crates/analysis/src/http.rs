use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use vibesense_core::config::AnalysisConfig;
use vibesense_core::{AnalysisResult, SentimentLabel};

use crate::analyzer::{AnalysisError, Analyzer};

/// Client for the model server's `POST /analyze/` endpoint.
pub struct HttpAnalyzer {
    client: reqwest::Client,
    url: String,
    batch_size: usize,
}

/// One element of the server's response array. The echoed `text` is ignored.
#[derive(Debug, Deserialize)]
struct AnalysisOutput {
    sentiment: SentimentLabel,
    confidence: f64,
    #[serde(default)]
    summary: Option<String>,
}

impl HttpAnalyzer {
    pub fn new(url: String, batch_size: usize, timeout: Duration) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            batch_size: batch_size.max(1),
        })
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        Self::new(
            config.url.clone(),
            config.batch_size,
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn analyze_chunk(&self, texts: &[String]) -> Result<Vec<AnalysisResult>, AnalysisError> {
        let url = format!("{}/analyze/", self.url);
        debug!(url = %url, texts = texts.len(), "Analysis request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(texts)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api { status, body });
        }

        let outputs: Vec<AnalysisOutput> = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;
        if outputs.len() != texts.len() {
            return Err(AnalysisError::Mismatch {
                expected: texts.len(),
                got: outputs.len(),
            });
        }

        Ok(outputs
            .into_iter()
            .map(|o| AnalysisResult {
                comment_id: None,
                sentiment: o.sentiment,
                confidence: o.confidence,
                summary: o.summary.filter(|s| !s.trim().is_empty()),
            })
            .collect())
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(&self, texts: &[String]) -> Result<Vec<AnalysisResult>, AnalysisError> {
        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            results.extend(self.analyze_chunk(chunk).await?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_output() {
        let body = r#"[
            {"text": "", "sentiment": "POSITIVE", "confidence": 0.98, "summary": "great video"},
            {"text": "", "sentiment": "NEGATIVE", "confidence": 0.71}
        ]"#;
        let outputs: Vec<AnalysisOutput> = serde_json::from_str(body).unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].sentiment, SentimentLabel::Positive);
        assert_eq!(outputs[0].summary.as_deref(), Some("great video"));
        assert!(outputs[1].summary.is_none());
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let analyzer =
            HttpAnalyzer::new("http://model:8001/".into(), 0, Duration::from_secs(5)).unwrap();
        assert_eq!(analyzer.url, "http://model:8001");
        assert_eq!(analyzer.batch_size, 1);
    }
}
