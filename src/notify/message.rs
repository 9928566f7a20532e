// src/notify/message.rs
//! Plain-text message bodies. Timestamps are always rendered in UTC.

use super::truncate_chars;
use crate::ingest::types::NewsHit;
use crate::registry::TrackedIssuer;
use crate::sec::SelectedFiling;

pub const SUMMARY_MAX_CHARS: usize = 260;
pub const ERROR_MAX_CHARS: usize = 1700;

pub fn filing(issuer: &TrackedIssuer, f: &SelectedFiling) -> String {
    format!(
        "{} {} filed {} | period {} | {}",
        issuer.symbol,
        f.form,
        f.filed_date,
        f.as_of_date(),
        f.primary_document_url
    )
}

fn summarize(text: &str) -> String {
    let s = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if s.chars().count() <= SUMMARY_MAX_CHARS {
        return s;
    }
    format!("{}...", truncate_chars(&s, SUMMARY_MAX_CHARS - 3))
}

pub fn news(hit: &NewsHit) -> String {
    let item = &hit.item;
    let published = item
        .published_at_utc
        .map(|t| format!(" ({})", t.format("%Y-%m-%d %H:%M UTC")))
        .unwrap_or_default();
    let tickers = hit
        .matched_tickers
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let mut summary = summarize(&item.summary_text);
    if summary.is_empty() {
        summary = summarize(&item.title);
    }
    format!(
        "---\n{}{published}\n[{tickers}]\n\n{summary}\n\n<{}>\n---",
        item.title, item.link
    )
}

pub fn tick_error(message: &str) -> String {
    format!("Polling error: {}", truncate_chars(message, ERROR_MAX_CHARS))
}

pub fn startup(beacon_id: &str, poll_ms: u64) -> String {
    format!("Polling start: {beacon_id} {poll_ms}ms")
}

pub fn heartbeat(polls: u64, last_tasks: &[String]) -> String {
    let tasks = if last_tasks.is_empty() {
        "-".to_string()
    } else {
        last_tasks.join(",")
    };
    format!("Beacon state: polls={polls}, last tasks={tasks}")
}
