// src/scan/filings.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};

use super::ScanEnv;
use crate::dedup::{FilingEvent, FilingState, ScanSummary};
use crate::notify::message;
use crate::registry::{Registry, TrackedIssuer};
use crate::sec::{latest_by_cik, select_newest, CurrentEntry, SelectedFiling};
use crate::store;

/// Shared by every filing task; tasks run one at a time under the tick guard.
pub const FILINGS_STATE_KEY: &str = "filings";

/// Store key of an archived primary document.
pub fn document_key(cik: &str, accession: &str) -> String {
    format!("doc-{cik}-{accession}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedDocument {
    pub symbol: String,
    pub accession: String,
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingStatus {
    New,
    NoChange,
    NoRecentMatch,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerResult {
    pub symbol: String,
    pub cik: String,
    pub status: FilingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filing: Option<SelectedFiling>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IssuerResult {
    fn new(issuer: &TrackedIssuer, status: FilingStatus) -> Self {
        Self {
            symbol: issuer.symbol.clone(),
            cik: issuer.regulator_id.clone(),
            status,
            filing: None,
            error: None,
        }
    }

    fn with_filing(mut self, f: SelectedFiling) -> Self {
        self.filing = Some(f);
        self
    }

    fn with_error(mut self, e: &anyhow::Error) -> Self {
        self.error = Some(format!("{e:#}"));
        self
    }
}

/// Outcome of one "latest filings" feed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentFeedStat {
    pub form: String,
    pub ok: bool,
    pub entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingScanReport {
    /// Registry order. A current-feed scan only lists issuers seen on the feed.
    pub results: Vec<IssuerResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub current_feeds: Vec<CurrentFeedStat>,
}

impl FilingScanReport {
    pub fn count(&self, status: FilingStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn get(&self, symbol: &str) -> Option<&IssuerResult> {
        self.results.iter().find(|r| r.symbol == symbol)
    }
}

/// Sequential sweep over the registry. The last-seen accession of an issuer
/// only changes after its notification went out.
pub async fn run_filing_scan(
    env: &ScanEnv,
    registry: &Registry,
    now: DateTime<Utc>,
) -> Result<FilingScanReport> {
    let mut state: FilingState = store::load_or_default(env.store.as_ref(), FILINGS_STATE_KEY).await;
    let since = state.last_scan_summary.as_ref().map_or(now, |s| s.at);
    let mut report = FilingScanReport::default();

    for issuer in registry.issuers() {
        let result = check_issuer(env, issuer, &mut state, now).await;
        report.results.push(result);
    }

    finish(env, state, report, since, now).await
}

/// Reads the "latest filings" feeds for `forms` and only looks up the
/// history of tracked issuers that appear there. An issuer whose announced
/// accession was already notified is not looked up at all.
pub async fn run_current_filing_scan(
    env: &ScanEnv,
    forms: &[String],
    registry: &Registry,
    now: DateTime<Utc>,
) -> Result<FilingScanReport> {
    let mut state: FilingState = store::load_or_default(env.store.as_ref(), FILINGS_STATE_KEY).await;
    let since = state.last_scan_summary.as_ref().map_or(now, |s| s.at);
    let mut report = FilingScanReport::default();

    let mut entries: Vec<CurrentEntry> = Vec::new();
    for form in forms {
        match env.filings.fetch_current(form).await {
            Ok(found) => {
                report.current_feeds.push(CurrentFeedStat {
                    form: form.clone(),
                    ok: true,
                    entries: found.len(),
                    error: None,
                });
                entries.extend(found);
            }
            Err(e) => {
                tracing::warn!(target: "scan", %form, error = %format!("{e:#}"), "latest filings feed unavailable");
                report.current_feeds.push(CurrentFeedStat {
                    form: form.clone(),
                    ok: false,
                    entries: 0,
                    error: Some(format!("{e:#}")),
                });
            }
        }
    }
    let latest = latest_by_cik(&entries);

    for issuer in registry.issuers() {
        let Some(entry) = latest.get(&issuer.regulator_id) else {
            continue;
        };
        let known = entry
            .accession
            .as_deref()
            .is_some_and(|acc| !state.is_novel(&issuer.regulator_id, acc));
        if known {
            report
                .results
                .push(IssuerResult::new(issuer, FilingStatus::NoChange));
            continue;
        }
        let result = check_issuer(env, issuer, &mut state, now).await;
        report.results.push(result);
    }

    finish(env, state, report, since, now).await
}

/// History lookup, selection, dispatch and record for one issuer.
async fn check_issuer(
    env: &ScanEnv,
    issuer: &TrackedIssuer,
    state: &mut FilingState,
    now: DateTime<Utc>,
) -> IssuerResult {
    let cik = &issuer.regulator_id;
    let history = match env.filings.fetch_history(cik).await {
        Ok(h) => h,
        Err(e) => {
            tracing::warn!(target: "scan", symbol = %issuer.symbol, %cik, error = %format!("{e:#}"), "filing history unavailable");
            return IssuerResult::new(issuer, FilingStatus::Error).with_error(&e);
        }
    };

    let Some(filing) = select_newest(&history, env.include_amendments) else {
        return IssuerResult::new(issuer, FilingStatus::NoRecentMatch);
    };

    if !state.is_novel(cik, &filing.accession_id) {
        return IssuerResult::new(issuer, FilingStatus::NoChange).with_filing(filing);
    }

    if let Err(e) = env.notifier.send(&message::filing(issuer, &filing)).await {
        tracing::warn!(target: "scan", symbol = %issuer.symbol, error = %format!("{e:#}"), "filing dispatch failed");
        return IssuerResult::new(issuer, FilingStatus::Error)
            .with_filing(filing)
            .with_error(&e);
    }

    counter!("beacon_filings_new_total").increment(1);
    tracing::info!(target: "scan", symbol = %issuer.symbol, form = %filing.form, accession = %filing.accession_id, "new filing");
    let stored_document = if env.archive_documents {
        archive_document(env, issuer, &filing, now).await
    } else {
        None
    };
    state.record(FilingEvent {
        symbol: issuer.symbol.clone(),
        cik: cik.clone(),
        form: filing.form.clone(),
        accession: filing.accession_id.clone(),
        filed_at: filing.filed_date.clone(),
        url: filing.primary_document_url.clone(),
        primary_document: filing.primary_document.clone(),
        stored_document,
    });
    IssuerResult::new(issuer, FilingStatus::New).with_filing(filing)
}

/// Best effort: a missing archive never holds back the filing itself.
async fn archive_document(
    env: &ScanEnv,
    issuer: &TrackedIssuer,
    filing: &SelectedFiling,
    now: DateTime<Utc>,
) -> Option<String> {
    let url = &filing.primary_document_url;
    let body = match env.filings.fetch_document(url).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(target: "scan", symbol = %issuer.symbol, %url, error = %format!("{e:#}"), "primary document unavailable");
            return None;
        }
    };
    let key = document_key(&issuer.regulator_id, &filing.accession_id);
    let doc = ArchivedDocument {
        symbol: issuer.symbol.clone(),
        accession: filing.accession_id.clone(),
        url: url.clone(),
        fetched_at: now,
        body,
    };
    match store::save(env.store.as_ref(), &key, &doc).await {
        Ok(()) => Some(key),
        Err(e) => {
            tracing::warn!(target: "scan", symbol = %issuer.symbol, %key, error = %format!("{e:#}"), "archiving primary document failed");
            None
        }
    }
}

async fn finish(
    env: &ScanEnv,
    mut state: FilingState,
    report: FilingScanReport,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<FilingScanReport> {
    let sent = report.count(FilingStatus::New);
    let failed = report
        .results
        .iter()
        .filter(|r| r.status == FilingStatus::Error && r.filing.is_some())
        .count();
    state.last_scan_summary = Some(ScanSummary {
        at: now,
        since,
        matched: sent + failed,
        sent,
        failed,
    });
    store::save(env.store.as_ref(), FILINGS_STATE_KEY, &state).await?;

    tracing::info!(
        target: "scan",
        issuers = report.results.len(),
        new = sent,
        no_change = report.count(FilingStatus::NoChange),
        errors = report.count(FilingStatus::Error),
        current_feeds = report.current_feeds.len(),
        "filing scan done"
    );
    Ok(report)
}
