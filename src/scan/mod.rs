//! Scan tasks: filing sweeps (whole registry, or only the issuers on the
//! "latest filings" feed) and any number of news sweeps.
//!
//! Each news task owns its persisted state key. Filing tasks share one
//! ledger so a filing is notified once whichever sweep finds it. Per-source
//! and per-issuer failures end up in the returned report; only state
//! persistence failures (and setup errors) come back as `Err`.

pub mod filings;
pub mod news;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::config::{TaskKind, TaskSpec};
use crate::detect::TickerDetector;
use crate::ingest::FeedFetcher;
use crate::notify::Notifier;
use crate::registry::Registry;
use crate::sec::FilingSource;
use crate::store::StateStore;

pub use filings::{
    document_key, run_current_filing_scan, run_filing_scan, ArchivedDocument, CurrentFeedStat,
    FilingScanReport, FilingStatus, IssuerResult, FILINGS_STATE_KEY,
};
pub use news::{news_state_key, run_news_scan, NewsScanReport};

/// Collaborators shared by every scan task.
#[derive(Clone)]
pub struct ScanEnv {
    pub fetcher: FeedFetcher,
    pub filings: Arc<dyn FilingSource>,
    pub store: Arc<dyn StateStore>,
    pub notifier: Arc<dyn Notifier>,
    /// News channel; usually the same sink as `notifier`.
    pub news_notifier: Arc<dyn Notifier>,
    pub include_amendments: bool,
    /// Fetch and store the primary document of every new filing.
    pub archive_documents: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TaskReport {
    Filings(FilingScanReport),
    News(NewsScanReport),
}

impl TaskReport {
    /// Notifications that went out during the task.
    pub fn sent(&self) -> usize {
        match self {
            TaskReport::Filings(r) => r.count(FilingStatus::New),
            TaskReport::News(r) => r.sent,
        }
    }
}

/// Run one configured task against this tick's registry snapshot.
pub async fn run_task(
    env: &ScanEnv,
    task: &TaskSpec,
    registry: &Registry,
    now: DateTime<Utc>,
) -> Result<TaskReport> {
    match &task.kind {
        TaskKind::Filings => Ok(TaskReport::Filings(
            run_filing_scan(env, registry, now).await?,
        )),
        TaskKind::CurrentFilings { forms } => Ok(TaskReport::Filings(
            run_current_filing_scan(env, forms, registry, now).await?,
        )),
        TaskKind::News { feeds } => {
            let detector = TickerDetector::new(registry.symbols());
            Ok(TaskReport::News(
                run_news_scan(env, &task.id, feeds, &detector, now).await?,
            ))
        }
    }
}
