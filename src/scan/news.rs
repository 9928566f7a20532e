// src/scan/news.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;

use super::ScanEnv;
use crate::dedup::{screen, ScanState, ScanSummary};
use crate::detect::TickerDetector;
use crate::ingest::types::{NewsHit, SourceStat};
use crate::notify::message;
use crate::schedule::TaskId;
use crate::store;

pub fn news_state_key(task: &TaskId) -> String {
    format!("news-{task}")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsScanReport {
    pub task: TaskId,
    pub effective_since: DateTime<Utc>,
    pub fetched: usize,
    pub matched: usize,
    /// Novel hits, newest first, in dispatch order.
    pub novel: Vec<NewsHit>,
    pub sent: usize,
    pub failed: usize,
    /// Feeds that could not be fetched this run.
    pub failed_sources: usize,
    pub watermark_advanced: bool,
    pub seen_keys: usize,
    pub per_source_stats: Vec<SourceStat>,
}

/// Fetch, detect, screen, dispatch, commit.
///
/// Keys are committed per delivered hit. The watermark only moves when
/// every feed answered and every novel hit went out, so neither a failed
/// dispatch nor an outage window is skipped on the next run.
pub async fn run_news_scan(
    env: &ScanEnv,
    task: &TaskId,
    feeds: &[String],
    detector: &TickerDetector,
    now: DateTime<Utc>,
) -> Result<NewsScanReport> {
    let key = news_state_key(task);
    let mut state: ScanState = store::load_or_default(env.store.as_ref(), &key).await;

    let outcome = env.fetcher.fetch_all(feeds).await;
    let failed_sources = outcome.per_source_stats.iter().filter(|s| !s.ok).count();
    let fetched = outcome.items.len();
    let candidates = detector.candidates(outcome.items);
    let matched = candidates.len();
    let screened = screen(candidates, &state, now);

    let mut sent = 0;
    let mut failed = 0;
    let mut novel = Vec::with_capacity(screened.novel.len());
    for staged in screened.novel {
        match env.news_notifier.send(&message::news(&staged.hit)).await {
            Ok(()) => {
                state.record_delivered(staged.keys);
                sent += 1;
            }
            Err(e) => {
                tracing::warn!(
                    target: "scan",
                    task = %task,
                    link = %staged.hit.item.link,
                    error = %format!("{e:#}"),
                    "news dispatch failed"
                );
                failed += 1;
            }
        }
        novel.push(staged.hit);
    }
    counter!("beacon_novel_hits_total").increment(novel.len() as u64);

    let watermark_advanced = failed == 0 && failed_sources == 0;
    if watermark_advanced {
        state.advance_watermark(now);
    }
    state.last_scan_summary = Some(ScanSummary {
        at: now,
        since: screened.effective_since,
        matched,
        sent,
        failed,
    });
    store::save(env.store.as_ref(), &key, &state).await?;

    tracing::info!(
        target: "scan",
        task = %task,
        fetched,
        matched,
        novel = novel.len(),
        sent,
        failed,
        failed_sources,
        watermark_advanced,
        since = %screened.effective_since,
        "news scan done"
    );

    Ok(NewsScanReport {
        task: task.clone(),
        effective_since: screened.effective_since,
        fetched,
        matched,
        novel,
        sent,
        failed,
        failed_sources,
        watermark_advanced,
        seen_keys: state.seen_keys.len(),
        per_source_stats: outcome.per_source_stats,
    })
}
