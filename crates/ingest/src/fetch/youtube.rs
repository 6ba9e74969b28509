//! YouTube Data API v3 comment fetcher.
//!
//! Walks `commentThreads` newest-first. Stops after the first page that
//! reaches back to the watermark, or after the last page.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use vibesense_core::config::YoutubeConfig;
use vibesense_core::Comment;

use super::traits::{CommentFetcher, FetchError};

const PAGE_SIZE: &str = "100";

pub struct YoutubeFetcher {
    client: Client,
    api_url: String,
    api_key: String,
}

impl YoutubeFetcher {
    pub fn new(api_url: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_config(config: &YoutubeConfig) -> Result<Self, FetchError> {
        let key = config
            .api_key
            .clone()
            .ok_or_else(|| FetchError::Config("YOUTUBE_API_KEY is not set".into()))?;
        Ok(Self::new(config.api_url.clone(), key))
    }

    async fn fetch_page(
        &self,
        video_id: &str,
        page_token: Option<&str>,
    ) -> Result<ThreadPage, FetchError> {
        let mut query = vec![
            ("part", "snippet"),
            ("videoId", video_id),
            ("order", "time"),
            ("textFormat", "plainText"),
            ("maxResults", PAGE_SIZE),
            ("key", self.api_key.as_str()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let response = self
            .client
            .get(format!("{}/commentThreads", self.api_url))
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Api { status, body });
        }

        response
            .json::<ThreadPage>()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))
    }
}

#[async_trait]
impl CommentFetcher for YoutubeFetcher {
    async fn fetch_comments(
        &self,
        target_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Comment>, FetchError> {
        let mut comments = Vec::new();
        let mut token: Option<String> = None;
        let mut page_no = 0u32;

        // Every comment newer than `since` must be returned, so no page cap.
        loop {
            page_no += 1;
            let page = self.fetch_page(target_id, token.as_deref()).await?;
            let batch = page.comments();
            let reached_watermark = reaches(&batch, since);
            comments.extend(batch);

            debug!(target = %target_id, page = page_no, total = comments.len(), "Fetched comment page");

            match page.next_page_token {
                Some(next) if !reached_watermark => {
                    if token.as_deref() == Some(next.as_str()) {
                        return Err(FetchError::Parse(format!(
                            "page token {next} repeated on page {page_no}"
                        )));
                    }
                    token = Some(next);
                }
                _ => return Ok(comments),
            }
        }
    }
}

/// True when the page already includes something at or before `since`.
fn reaches(page: &[Comment], since: Option<DateTime<Utc>>) -> bool {
    match since {
        Some(since) => page.iter().any(|c| c.published_at <= since),
        None => false,
    }
}

// ── Wire format ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadPage {
    next_page_token: Option<String>,
    #[serde(default)]
    items: Vec<Thread>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Thread {
    id: String,
    snippet: ThreadSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThreadSnippet {
    top_level_comment: TopLevelComment,
    #[serde(default)]
    total_reply_count: i64,
}

#[derive(Debug, Deserialize)]
struct TopLevelComment {
    snippet: CommentSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    #[serde(default)]
    text_original: Option<String>,
    #[serde(default)]
    text_display: Option<String>,
    published_at: DateTime<Utc>,
    #[serde(default)]
    like_count: i64,
}

impl ThreadPage {
    fn comments(&self) -> Vec<Comment> {
        self.items
            .iter()
            .map(|thread| {
                let snippet = &thread.snippet.top_level_comment.snippet;
                let text = snippet
                    .text_original
                    .clone()
                    .or_else(|| snippet.text_display.clone())
                    .unwrap_or_default();
                Comment {
                    id: thread.id.clone(),
                    text,
                    published_at: snippet.published_at,
                    metrics: HashMap::from([
                        ("likes".to_string(), snippet.like_count),
                        ("replies".to_string(), thread.snippet.total_reply_count),
                    ]),
                }
            })
            .collect()
    }
}
