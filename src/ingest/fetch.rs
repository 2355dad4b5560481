// src/ingest/fetch.rs
use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::ingest::config::IngestSettings;

/// Kind of resource requested; drives the `Accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    Html,
    Csv,
    Json,
}

impl Accept {
    pub fn header_value(&self) -> &'static str {
        match self {
            Accept::Html => "text/html,application/xhtml+xml,application/xml",
            Accept::Csv => "text/csv,text/plain,text/tab-separated-values;q=0.9,*/*;q=0.8",
            Accept::Json => "application/json,text/plain,*/*",
        }
    }
}

/// Source of page bodies. `None` means the resource could not be obtained
/// after every retry; callers treat that as "nothing found", never as an error.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, accept: Accept) -> Option<String>;

    async fn fetch_html(&self, url: &str) -> Option<String> {
        self.fetch(url, Accept::Html).await
    }
}

/// reqwest-backed fetcher with fixed user agent, timeout and linear backoff.
pub struct HttpFetcher {
    client: reqwest::Client,
    attempts: u32,
    backoff: Duration,
    csv_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &IngestSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_millis(settings.http_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            attempts: settings.fetch_attempts.max(1),
            backoff: Duration::from_millis(settings.fetch_backoff_ms),
            csv_timeout: Duration::from_millis(settings.municipal_csv_timeout_ms),
        })
    }

    async fn fetch_once(&self, url: &str, accept: Accept) -> Result<String> {
        let mut req = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, accept.header_value());
        if accept == Accept::Csv {
            req = req.timeout(self.csv_timeout);
        }
        let resp = req.send().await?.error_for_status()?;
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, accept: Accept) -> Option<String> {
        for attempt in 1..=self.attempts {
            match self.fetch_once(url, accept).await {
                Ok(body) => return Some(body),
                Err(e) => {
                    tracing::warn!(
                        target: "ingest",
                        url,
                        attempt,
                        error = %e,
                        "fetch attempt failed"
                    );
                    if attempt < self.attempts {
                        tokio::time::sleep(self.backoff * attempt).await;
                    }
                }
            }
        }
        tracing::error!(target: "ingest", url, attempts = self.attempts, "fetch gave up");
        counter!("ingest_fetch_failures_total").increment(1);
        None
    }
}

/// In-memory fetcher serving fixed bodies per URL; records every request.
/// Unknown URLs behave like a fetch that exhausted its retries.
#[derive(Default)]
pub struct FixtureFetcher {
    pages: HashMap<String, String>,
    pub requests: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(url.into(), body.into());
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, body: impl Into<String>) {
        self.pages.insert(url.into(), body.into());
    }

    /// URLs requested so far, in order.
    pub fn requested(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PageFetcher for FixtureFetcher {
    async fn fetch(&self, url: &str, _accept: Accept) -> Option<String> {
        if let Ok(mut v) = self.requests.lock() {
            v.push(url.to_string());
        }
        self.pages.get(url).cloned()
    }
}
