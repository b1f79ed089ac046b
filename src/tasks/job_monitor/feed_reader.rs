use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::errors::PipelineError;

/// One item from a polled feed, normalized. Lives only for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub id: String,
    pub title: String,
    pub description: String,
    pub link: String,
}

impl FeedEntry {
    fn from_feed_rs(entry: feed_rs::model::Entry) -> Self {
        let link = entry
            .links
            .first()
            .map(|l| l.href.clone())
            .unwrap_or_default();

        // feed-rs synthesizes an id when the feed omits one; empty still happens
        let id = if entry.id.trim().is_empty() {
            link.clone()
        } else {
            entry.id
        };

        let title = entry
            .title
            .or_else(|| entry.summary.clone())
            .map(|t| t.content)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        let description = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .unwrap_or_default();

        FeedEntry {
            id,
            title,
            description,
            link,
        }
    }
}

/// Entries of one feed in feed order. Normalization happens as the sequence
/// is consumed.
pub struct FeedEntries(Box<dyn Iterator<Item = FeedEntry> + Send>);

impl FeedEntries {
    pub fn parse(body: &[u8]) -> Result<Self, PipelineError> {
        let parsed = feed_rs::parser::parse(body).map_err(|e| {
            log::warn!("Error parsing feed: {e:?}");
            PipelineError::Feed(format!("unable to parse feed: {e}"))
        })?;
        log::debug!("Parsed feed with {} entries", parsed.entries.len());
        Ok(FeedEntries(Box::new(
            parsed.entries.into_iter().map(FeedEntry::from_feed_rs),
        )))
    }
}

impl From<Vec<FeedEntry>> for FeedEntries {
    fn from(entries: Vec<FeedEntry>) -> Self {
        FeedEntries(Box::new(entries.into_iter()))
    }
}

impl Iterator for FeedEntries {
    type Item = FeedEntry;

    fn next(&mut self) -> Option<FeedEntry> {
        self.0.next()
    }
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FeedEntries, PipelineError>;
}

/// Fetches feeds over HTTP and parses RSS, Atom or JSON Feed bodies.
pub struct HttpFeedReader {
    http_client: Client,
}

impl HttpFeedReader {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("jobalert/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpFeedReader { http_client })
    }
}

#[async_trait]
impl FeedSource for HttpFeedReader {
    async fn fetch(&self, url: &str) -> Result<FeedEntries, PipelineError> {
        let response = self
            .http_client
            .get(url)
            // See: https://stackoverflow.com/a/7001617/5155484
            .header(
                "Accept",
                "application/rss+xml, application/rdf+xml, application/atom+xml, application/feed+json, application/xml;q=0.9, text/xml;q=0.8",
            )
            .send()
            .await
            .map_err(|e| {
                log::warn!("Error getting feed {url}: {e:?}");
                PipelineError::Feed(e.to_string())
            })?;

        if !response.status().is_success() {
            log::warn!(
                "Got non-success response for feed {}: {}",
                url,
                response.status()
            );
            return Err(PipelineError::Feed(format!(
                "{url} returned {}",
                response.status()
            )));
        }

        log::info!("Got response for feed {url}");
        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::Feed(e.to_string()))?;
        FeedEntries::parse(&body)
    }
}
