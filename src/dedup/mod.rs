//! # Dedup Ledger
//!
//! Decides which candidates are new relative to everything already
//! notified, across runs.
//!
//! News scans use a windowed, key-based ledger:
//! - `effective_since = max(watermark, now - FLOOR_WINDOW)`; anything published
//!   strictly before it is out, seen or not.
//! - Each hit carries several candidate keys (`id:`, `url:`, `title:`); any one
//!   of them found in the seen set suppresses the hit.
//! - Seen keys are a FIFO-bounded set (see [`SeenKeys`]).
//! - The watermark only moves forward, and only after a completed scan.
//!
//! Filing scans use [`FilingState`]: one last-seen accession per issuer.

pub mod seen;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::ingest::types::NewsHit;

pub use seen::{SeenKeys, SEEN_KEYS_CAPACITY};

/// Oldest publication a news scan will ever consider.
pub const FLOOR_WINDOW_DAYS: i64 = 15;

pub fn floor_window() -> Duration {
    Duration::days(FLOOR_WINDOW_DAYS)
}

/// What the last run of a scan task saw, for status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub at: DateTime<Utc>,
    pub since: DateTime<Utc>,
    pub matched: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Persisted ledger of one news scan task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanState {
    #[serde(default)]
    pub watermark_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub seen_keys: SeenKeys,
    #[serde(default)]
    pub last_scan_summary: Option<ScanSummary>,
}

impl ScanState {
    pub fn effective_since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let floor = now - floor_window();
        match self.watermark_timestamp {
            Some(w) if w > floor => w,
            _ => floor,
        }
    }

    /// Monotonic: an older `now` never moves the watermark back.
    pub fn advance_watermark(&mut self, now: DateTime<Utc>) {
        if self.watermark_timestamp.map_or(true, |w| now > w) {
            self.watermark_timestamp = Some(now);
        }
    }

    pub fn record_delivered<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seen_keys.extend(keys);
    }
}

/// Drop the fragment so `page#top` and `page` collide.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    match reqwest::Url::parse(trimmed) {
        Ok(mut u) => {
            u.set_fragment(None);
            u.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}

/// Candidate dedup keys of a hit, strongest identity first.
pub fn candidate_keys(hit: &NewsHit) -> Vec<String> {
    let item = &hit.item;
    let mut keys = Vec::with_capacity(3);

    if let Some(guid) = item.guid.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
        keys.push(format!("id:{guid}"));
    }
    let url = normalize_url(&item.link);
    if !url.is_empty() {
        keys.push(format!("url:{url}"));
    }
    let title = item.title.trim().to_lowercase();
    if let (false, Some(ts)) = (title.is_empty(), item.published_at_utc) {
        keys.push(format!("title:{title}|{}", ts.format("%Y-%m-%dT%H:%M")));
    }
    keys
}

/// A novel hit together with the keys to commit once it is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staged {
    pub hit: NewsHit,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screened {
    pub effective_since: DateTime<Utc>,
    /// Newest first.
    pub novel: Vec<Staged>,
}

/// Window + seen-set screening. Does not touch `state`.
///
/// Duplicates inside the batch (the same story in two feeds) collapse to the
/// first occurrence.
pub fn screen(candidates: Vec<NewsHit>, state: &ScanState, now: DateTime<Utc>) -> Screened {
    let effective_since = state.effective_since(now);
    let since_ms = effective_since.timestamp_millis();
    let mut staged_keys: HashSet<String> = HashSet::new();
    let mut novel = Vec::new();

    for hit in candidates {
        let Some(published) = hit.item.published_epoch_ms else {
            continue;
        };
        if published < since_ms {
            continue;
        }
        let keys = candidate_keys(&hit);
        if keys.is_empty()
            || state.seen_keys.contains_any(&keys)
            || keys.iter().any(|k| staged_keys.contains(k))
        {
            continue;
        }
        staged_keys.extend(keys.iter().cloned());
        novel.push(Staged { hit, keys });
    }

    novel.sort_by(|a, b| b.hit.published_ms().cmp(&a.hit.published_ms()));
    Screened {
        effective_since,
        novel,
    }
}

/// Screen and commit in one step: every novel hit counts as delivered and
/// the watermark advances to `now`.
pub fn filter_novel(
    candidates: Vec<NewsHit>,
    state: &ScanState,
    now: DateTime<Utc>,
) -> (Vec<NewsHit>, ScanState) {
    let screened = screen(candidates, state, now);
    let mut updated = state.clone();
    let mut novel = Vec::with_capacity(screened.novel.len());
    for staged in screened.novel {
        updated.record_delivered(staged.keys);
        novel.push(staged.hit);
    }
    updated.advance_watermark(now);
    (novel, updated)
}

pub const FILING_EVENTS_CAP: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingEvent {
    pub symbol: String,
    pub cik: String,
    pub form: String,
    pub accession: String,
    pub filed_at: String,
    pub url: String,
    #[serde(default)]
    pub primary_document: String,
    /// State-store key of the archived primary document, when it was fetched.
    #[serde(default)]
    pub stored_document: Option<String>,
}

/// Persisted ledger of the filing scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingState {
    /// cik10 -> accession
    #[serde(default)]
    pub last_seen_by_cik: BTreeMap<String, String>,
    /// Newest first.
    #[serde(default)]
    pub events: Vec<FilingEvent>,
    #[serde(default)]
    pub last_scan_summary: Option<ScanSummary>,
}

impl FilingState {
    /// Newest first, at most `limit`.
    pub fn recent_events(&self, limit: usize) -> &[FilingEvent] {
        &self.events[..self.events.len().min(limit)]
    }

    pub fn is_novel(&self, cik: &str, accession: &str) -> bool {
        self.last_seen_by_cik.get(cik).map(String::as_str) != Some(accession)
    }

    pub fn record(&mut self, event: FilingEvent) {
        self.last_seen_by_cik
            .insert(event.cik.clone(), event.accession.clone());
        self.events.insert(0, event);
        self.events.truncate(FILING_EVENTS_CAP);
    }
}
