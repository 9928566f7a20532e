// src/sec/current.rs
//! EDGAR "latest filings" Atom feed (`browse-edgar?action=getcurrent`).
//!
//! Entry titles look like `10-Q - NVIDIA CORP (0001045810) (Filer)`. The
//! accession comes from the `-index.htm` link, or from the `AccNo:` line of
//! the summary when the link has none.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

use crate::ingest::dates::parse_published;
use crate::ingest::xml::{EntryKind, FeedElements};

pub const DEFAULT_CURRENT_BASE: &str = "https://www.sec.gov";
pub const CURRENT_FEED_COUNT: u32 = 100;
pub const DEFAULT_CURRENT_FORMS: &[&str] = &["10-Q", "10-K"];

/// One filing announced on the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentEntry {
    /// Ten-digit, zero-padded.
    pub cik: String,
    pub form: String,
    pub accession: Option<String>,
    pub updated: Option<DateTime<Utc>>,
}

pub fn current_feed_url(base: &str, form: &str) -> String {
    format!(
        "{base}/cgi-bin/browse-edgar?action=getcurrent&CIK=&type={}&company=&dateb=&owner=include&start=0&count={CURRENT_FEED_COUNT}&output=atom",
        form.replace('/', "%2F")
    )
}

static RE_TITLE_CIK: OnceCell<Regex> = OnceCell::new();
static RE_INDEX_ACCESSION: OnceCell<Regex> = OnceCell::new();
static RE_SUMMARY_ACCESSION: OnceCell<Regex> = OnceCell::new();

fn cik_from_title(title: &str) -> Option<String> {
    let re = RE_TITLE_CIK.get_or_init(|| Regex::new(r"\((\d{10})\)").unwrap());
    re.captures(title).map(|c| c[1].to_string())
}

fn accession_from(link: &str, summary: &str) -> Option<String> {
    let re_link = RE_INDEX_ACCESSION
        .get_or_init(|| Regex::new(r"(?i)/(\d{10}-\d{2}-\d{6})-index\.html?").unwrap());
    if let Some(c) = re_link.captures(link) {
        return Some(c[1].to_string());
    }
    let re_summary = RE_SUMMARY_ACCESSION
        .get_or_init(|| Regex::new(r"(?i)AccNo:(?:</b>)?\s*(\d{10}-\d{2}-\d{6})").unwrap());
    re_summary.captures(summary).map(|c| c[1].to_string())
}

/// Entries without a CIK in the title are skipped. `fallback_form` applies
/// when an entry carries no category.
pub fn parse_current(xml: &str, fallback_form: &str) -> Vec<CurrentEntry> {
    FeedElements::new(xml)
        .filter(|e| e.kind == EntryKind::Atom)
        .filter_map(|e| {
            let cik = cik_from_title(&e.title)?;
            Some(CurrentEntry {
                cik,
                form: e.category.unwrap_or_else(|| fallback_form.to_string()),
                accession: accession_from(&e.link, &e.summary),
                updated: e.published.as_deref().and_then(parse_published),
            })
        })
        .collect()
}

/// Most recently updated entry per CIK; on ties the earlier entry stays.
pub fn latest_by_cik(entries: &[CurrentEntry]) -> HashMap<String, CurrentEntry> {
    let mut out: HashMap<String, CurrentEntry> = HashMap::new();
    for entry in entries {
        let newer = out
            .get(&entry.cik)
            .map_or(true, |prev| entry.updated > prev.updated);
        if newer {
            out.insert(entry.cik.clone(), entry.clone());
        }
    }
    out
}
