// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One normalized RSS item or Atom entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub title: String,
    pub summary_text: String,
    pub link: String,
    /// `<guid>` (RSS) or `<id>` (Atom), when the source provides one.
    pub guid: Option<String>,
    /// URL of the feed document this item came from.
    pub source_url: String,
    /// Title-cased first host label of `source_url`, e.g. "Reuters".
    pub source_name: String,
    pub published_at_raw: Option<String>,
    pub published_at_utc: Option<DateTime<Utc>>,
    pub published_epoch_ms: Option<i64>,
}

/// A feed item that mentions at least one tracked ticker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewsHit {
    #[serde(flatten)]
    pub item: FeedItem,
    pub matched_tickers: BTreeSet<String>,
}

impl NewsHit {
    /// Build a hit; `None` when no ticker matched or the timestamp is unknown.
    pub fn candidate(item: FeedItem, matched_tickers: BTreeSet<String>) -> Option<Self> {
        if matched_tickers.is_empty() || item.published_epoch_ms.is_none() {
            return None;
        }
        Some(Self {
            item,
            matched_tickers,
        })
    }

    pub fn published_ms(&self) -> i64 {
        self.item.published_epoch_ms.unwrap_or(i64::MIN)
    }
}

/// Fetch outcome for a single feed URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceStat {
    pub url: String,
    pub ok: bool,
    pub http_status: Option<u16>,
    pub item_count: usize,
    pub error: Option<String>,
}

impl SourceStat {
    pub fn ok(url: &str, status: u16, item_count: usize) -> Self {
        Self {
            url: url.to_string(),
            ok: true,
            http_status: Some(status),
            item_count,
            error: None,
        }
    }

    pub fn failed(url: &str, status: Option<u16>, error: Option<String>) -> Self {
        Self {
            url: url.to_string(),
            ok: false,
            http_status: status,
            item_count: 0,
            error,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchOutcome {
    pub items: Vec<FeedItem>,
    pub per_source_stats: Vec<SourceStat>,
}
