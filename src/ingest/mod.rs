// src/ingest/mod.rs
pub mod dates;
pub mod types;
pub mod xml;

use std::time::Duration;

use anyhow::{Context, Result};
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::ingest::types::{FeedItem, FetchOutcome, SourceStat};
use crate::ingest::xml::{FeedElements, RawEntry};

const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml, text/xml";
const MAX_TEXT_CHARS: usize = 1500;

/// Normalize feed text: unwrap CDATA, decode HTML entities, strip tags,
/// ASCII-fy typographic quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    static RE_CDATA: OnceCell<Regex> = OnceCell::new();
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    static RE_WS: OnceCell<Regex> = OnceCell::new();

    // 1) CDATA sections that survived as text
    let re_cdata = RE_CDATA.get_or_init(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap());
    let out = re_cdata.replace_all(s, "$1");

    // 2) HTML entity decode
    let out = html_escape::decode_html_entities(&out).to_string();

    // 3) Strip HTML tags (replaced by a space so words don't glue together)
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z!][^>]*>").unwrap());
    let out = re_tags.replace_all(&out, " ");

    // 4) “ ” ‘ ’ « » to ASCII quotes
    let out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 5) Collapse whitespace (incl. nbsp)
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"[\s\u{00A0}]+").unwrap());
    let out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > MAX_TEXT_CHARS {
        return out.chars().take(MAX_TEXT_CHARS).collect();
    }
    out
}

/// `https://www.reuters.com/markets/rss` → `Reuters`.
/// Falls back to the raw input when it isn't a URL with a host.
pub fn source_name_from_url(url: &str) -> String {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return url.to_string();
    };
    let Some(host) = parsed.host_str() else {
        return url.to_string();
    };
    let host = host.strip_prefix("www.").unwrap_or(host);
    let base = host.split('.').next().filter(|s| !s.is_empty()).unwrap_or(host);

    let mut chars = base.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => url.to_string(),
    }
}

fn to_feed_item(raw: RawEntry, source_url: &str, source_name: &str) -> Option<FeedItem> {
    let title = normalize_text(&raw.title);
    if title.is_empty() {
        return None;
    }
    let published_at_utc = raw.published.as_deref().and_then(dates::parse_published);

    Some(FeedItem {
        title,
        summary_text: normalize_text(&raw.summary),
        link: html_escape::decode_html_entities(raw.link.trim()).to_string(),
        guid: raw
            .guid
            .map(|g| normalize_text(&g))
            .filter(|g| !g.is_empty()),
        source_url: source_url.to_string(),
        source_name: source_name.to_string(),
        published_at_raw: raw.published,
        published_epoch_ms: published_at_utc.map(|dt| dt.timestamp_millis()),
        published_at_utc,
    })
}

/// Parse one feed body. RSS items and Atom entries are both collected;
/// elements without a title are dropped.
pub fn parse_feed(xml: &str, source_url: &str) -> Vec<FeedItem> {
    let t0 = std::time::Instant::now();
    let source_name = source_name_from_url(source_url);

    let items: Vec<FeedItem> = FeedElements::new(xml)
        .filter_map(|raw| to_feed_item(raw, source_url, &source_name))
        .collect();

    histogram!("beacon_feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("beacon_feed_items_total").increment(items.len() as u64);
    items
}

/// HTTP fetcher for RSS/Atom feeds.
#[derive(Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
}

impl FeedFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }

    /// Fetch every URL in order. A failing source is recorded in the stats
    /// and never stops the remaining fetches.
    pub async fn fetch_all(&self, urls: &[String]) -> FetchOutcome {
        let mut out = FetchOutcome::default();

        for url in urls {
            match self.fetch_one(url).await {
                Ok((status, items)) => {
                    tracing::debug!(target: "ingest", %url, status, items = items.len(), "feed fetched");
                    out.per_source_stats
                        .push(SourceStat::ok(url, status, items.len()));
                    out.items.extend(items);
                }
                Err(FetchError::Status(status)) => {
                    tracing::warn!(target: "ingest", %url, status, "feed returned non-2xx");
                    counter!("beacon_feed_errors_total").increment(1);
                    out.per_source_stats
                        .push(SourceStat::failed(url, Some(status), None));
                }
                Err(FetchError::Transport(e)) => {
                    tracing::warn!(target: "ingest", %url, error = %e, "feed fetch failed");
                    counter!("beacon_feed_errors_total").increment(1);
                    out.per_source_stats
                        .push(SourceStat::failed(url, None, Some(format!("{e:#}"))));
                }
            }
        }

        out
    }

    async fn fetch_one(&self, url: &str) -> std::result::Result<(u16, Vec<FeedItem>), FetchError> {
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, FEED_ACCEPT)
            .send()
            .await
            .with_context(|| format!("GET {url}"))
            .map_err(FetchError::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = resp
            .text()
            .await
            .with_context(|| format!("reading body of {url}"))
            .map_err(FetchError::Transport)?;

        Ok((status.as_u16(), parse_feed(&body, url)))
    }
}

enum FetchError {
    Status(u16),
    Transport(anyhow::Error),
}
