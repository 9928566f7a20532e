// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{http::StatusCode, routing::get, Router};
use chrono::{DateTime, Utc};

use filing_beacon::ingest::FeedFetcher;
use filing_beacon::notify::{Notifier, RecordingNotifier};
use filing_beacon::registry::{Registry, TrackedIssuer};
use filing_beacon::scan::ScanEnv;
use filing_beacon::sec::{CurrentEntry, FilingHistory, FilingSource};
use filing_beacon::store::{MemoryStore, StateStore};

/// Serve fixed `(path, status, body)` routes on an ephemeral port.
/// Returns the base URL, e.g. `http://127.0.0.1:54321`.
pub async fn serve(routes: Vec<(&'static str, StatusCode, String)>) -> String {
    let mut app = Router::new();
    for (path, status, body) in routes {
        app = app.route(
            path,
            get(move || {
                let body = body.clone();
                async move { (status, [("content-type", "application/rss+xml")], body) }
            }),
        );
    }
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{addr}")
}

/// Serve `body` at `path`, or HTTP 500 while the returned flag is set.
pub async fn serve_switchable(path: &'static str, body: String) -> (String, Arc<AtomicBool>) {
    let down = Arc::new(AtomicBool::new(true));
    let flag = down.clone();
    let app = Router::new().route(
        path,
        get(move || {
            let body = body.clone();
            let down = flag.load(Ordering::SeqCst);
            async move {
                if down {
                    (StatusCode::INTERNAL_SERVER_ERROR, "maintenance".to_string())
                } else {
                    (StatusCode::OK, body)
                }
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    (format!("http://{addr}"), down)
}

pub struct RssItem<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub link: &'a str,
    pub published: Option<DateTime<Utc>>,
}

/// Minimal RSS 2.0 document; `published: None` emits an unparseable date.
pub fn rss(items: &[RssItem<'_>]) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\"?>\n<rss version=\"2.0\"><channel><title>Test</title>\n",
    );
    for it in items {
        let date = it
            .published
            .map(|d| d.to_rfc2822())
            .unwrap_or_else(|| "sometime last week".to_string());
        out.push_str(&format!(
            "<item><title>{}</title><description><![CDATA[{}]]></description><link>{}</link><pubDate>{}</pubDate></item>\n",
            it.title, it.description, it.link, date
        ));
    }
    out.push_str("</channel></rss>\n");
    out
}

pub fn issuer(symbol: &str, cik: &str) -> TrackedIssuer {
    TrackedIssuer {
        symbol: symbol.into(),
        regulator_id: filing_beacon::registry::normalize_cik(cik),
        display_name: symbol.into(),
    }
}

pub fn registry(rows: &[(&str, &str)]) -> Registry {
    Registry::new(rows.iter().map(|(s, c)| issuer(s, c)).collect())
}

pub fn history(cik: &str, rows: &[(&str, &str)]) -> FilingHistory {
    FilingHistory {
        cik: cik.into(),
        form: rows.iter().map(|(f, _)| f.to_string()).collect(),
        accession_number: rows.iter().map(|(_, a)| a.to_string()).collect(),
        filing_date: rows.iter().map(|_| "2025-08-01".to_string()).collect(),
        primary_document: rows.iter().map(|_| "doc.htm".to_string()).collect(),
        report_date: None,
        acceptance_date_time: None,
    }
}

pub fn current_entry(cik10: &str, form: &str, accession: Option<&str>) -> CurrentEntry {
    CurrentEntry {
        cik: cik10.into(),
        form: form.into(),
        accession: accession.map(str::to_string),
        updated: None,
    }
}

/// cik10 -> history; unknown ciks and forms fail like an unreachable EDGAR.
#[derive(Default)]
pub struct StubFilings {
    histories: std::sync::Mutex<HashMap<String, FilingHistory>>,
    current: std::sync::Mutex<HashMap<String, Vec<CurrentEntry>>>,
    history_calls: std::sync::Mutex<Vec<String>>,
    pub fail_documents: AtomicBool,
}

impl StubFilings {
    pub fn set(&self, cik10: &str, h: FilingHistory) {
        self.histories.lock().unwrap().insert(cik10.to_string(), h);
    }

    pub fn set_current(&self, form: &str, entries: Vec<CurrentEntry>) {
        self.current.lock().unwrap().insert(form.to_string(), entries);
    }

    /// CIKs whose history was requested, in call order.
    pub fn history_calls(&self) -> Vec<String> {
        self.history_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl FilingSource for StubFilings {
    async fn fetch_history(&self, cik10: &str) -> Result<FilingHistory> {
        self.history_calls.lock().unwrap().push(cik10.to_string());
        self.histories
            .lock()
            .unwrap()
            .get(cik10)
            .cloned()
            .ok_or_else(|| anyhow!("SEC submissions failed for {cik10}: 503 Service Unavailable"))
    }

    async fn fetch_current(&self, form: &str) -> Result<Vec<CurrentEntry>> {
        self.current
            .lock()
            .unwrap()
            .get(form)
            .cloned()
            .ok_or_else(|| anyhow!("SEC latest filings failed for {form}: 503 Service Unavailable"))
    }

    async fn fetch_document(&self, url: &str) -> Result<String> {
        if self.fail_documents.load(Ordering::SeqCst) {
            return Err(anyhow!("SEC document failed: 404 Not Found"));
        }
        Ok(format!("<html>{url}</html>"))
    }
}

/// MemoryStore whose writes can be switched off.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_writes: AtomicBool,
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }
        self.inner.write(key, value).await
    }
}

pub struct Harness {
    pub env: ScanEnv,
    pub filings: Arc<StubFilings>,
    pub store: Arc<FlakyStore>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness() -> Harness {
    harness_with(Arc::new(RecordingNotifier::new()))
}

pub fn harness_with(notifier: Arc<RecordingNotifier>) -> Harness {
    let filings = Arc::new(StubFilings::default());
    let store = Arc::new(FlakyStore::default());
    let env = ScanEnv {
        fetcher: FeedFetcher::new("filing-beacon-tests", Duration::from_secs(5)).expect("fetcher"),
        filings: filings.clone(),
        store: store.clone(),
        notifier: notifier.clone(),
        news_notifier: notifier.clone() as Arc<dyn Notifier>,
        include_amendments: false,
        archive_documents: true,
    };
    Harness {
        env,
        filings,
        store,
        notifier,
    }
}
