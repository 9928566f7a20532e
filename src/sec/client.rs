// src/sec/client.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::current::{current_feed_url, parse_current, CurrentEntry, DEFAULT_CURRENT_BASE};
use super::FilingHistory;

pub const DEFAULT_SUBMISSIONS_BASE: &str = "https://data.sec.gov";
pub const DEFAULT_USER_AGENT: &str = "FilingBeacon/0.1 (example@example.com)";

#[async_trait]
pub trait FilingSource: Send + Sync {
    /// Full filing history of one issuer.
    async fn fetch_history(&self, cik10: &str) -> Result<FilingHistory>;

    /// Filings of one form type announced on the "latest filings" feed.
    async fn fetch_current(&self, form: &str) -> Result<Vec<CurrentEntry>>;

    /// Body of a filing document, e.g. its primary HTML.
    async fn fetch_document(&self, url: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct Submissions {
    #[serde(default)]
    cik: Option<serde_json::Value>,
    #[serde(default)]
    filings: Option<Filings>,
}

#[derive(Debug, Deserialize)]
struct Filings {
    #[serde(default)]
    recent: Option<FilingHistory>,
}

/// Parse an EDGAR submissions document into the `recent` history.
/// A document without `filings.recent` is an empty history, not an error.
pub fn parse_submissions(body: &str, fallback_cik: &str) -> Result<FilingHistory> {
    let sub: Submissions = serde_json::from_str(body).context("parsing EDGAR submissions json")?;
    let cik = match sub.cik {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => fallback_cik.to_string(),
    };
    let mut history = sub.filings.and_then(|f| f.recent).unwrap_or_default();
    history.cik = cik;
    Ok(history)
}

/// `data.sec.gov` submissions client. EDGAR rejects requests without a
/// contact User-Agent.
#[derive(Clone)]
pub struct EdgarClient {
    client: reqwest::Client,
    base_url: String,
    current_base_url: String,
}

impl EdgarClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("building EDGAR http client")?;
        Ok(Self {
            client,
            base_url: DEFAULT_SUBMISSIONS_BASE.to_string(),
            current_base_url: DEFAULT_CURRENT_BASE.to_string(),
        })
    }

    /// Point at a different host (mirrors, tests).
    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = base.into().trim_end_matches('/').to_string();
        self
    }

    /// Host serving `cgi-bin/browse-edgar`.
    pub fn with_current_base_url(mut self, base: impl Into<String>) -> Self {
        self.current_base_url = base.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_text(&self, url: &str, accept: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("GET {url} failed: {status}"));
        }
        resp.text()
            .await
            .with_context(|| format!("reading body of {url}"))
    }
}

#[async_trait]
impl FilingSource for EdgarClient {
    async fn fetch_history(&self, cik10: &str) -> Result<FilingHistory> {
        let url = format!("{}/submissions/CIK{cik10}.json", self.base_url);
        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("SEC submissions failed for {cik10}: {status}"));
        }
        let body = resp.text().await.context("reading submissions body")?;
        parse_submissions(&body, cik10)
    }

    async fn fetch_current(&self, form: &str) -> Result<Vec<CurrentEntry>> {
        let url = current_feed_url(&self.current_base_url, form);
        let xml = self
            .get_text(&url, "application/atom+xml, application/xml, text/xml")
            .await
            .with_context(|| format!("SEC latest filings feed for {form}"))?;
        Ok(parse_current(&xml, form))
    }

    async fn fetch_document(&self, url: &str) -> Result<String> {
        self.get_text(url, "text/html,application/xhtml+xml").await
    }
}
