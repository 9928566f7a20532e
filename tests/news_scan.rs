// tests/news_scan.rs
mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{Duration, Utc};

use common::{harness, harness_with, rss, serve, serve_switchable, RssItem};
use filing_beacon::dedup::{ScanState, SEEN_KEYS_CAPACITY};
use filing_beacon::detect::TickerDetector;
use filing_beacon::notify::RecordingNotifier;
use filing_beacon::scan::{news_state_key, run_news_scan};
use filing_beacon::schedule::TaskId;
use filing_beacon::store::{self, StateStore};

fn detector() -> TickerDetector {
    TickerDetector::new(["AAPL", "MSFT", "BRK.B"])
}

async fn feed_server() -> String {
    let now = Utc::now();
    let good = rss(&[
        RssItem {
            title: "Apple (AAPL) beats estimates",
            description: "<p>Shares of <b>AAPL</b> rose &amp; held.</p>",
            link: "https://news.example/aapl-beats",
            published: Some(now - Duration::hours(1)),
        },
        RssItem {
            title: "Oil slides on supply glut",
            description: "No tracked names here.",
            link: "https://news.example/oil",
            published: Some(now - Duration::minutes(30)),
        },
        RssItem {
            title: "MSFT outage report",
            description: "Timestamp is garbage.",
            link: "https://news.example/msft",
            published: None,
        },
    ]);
    serve(vec![
        ("/down.xml", StatusCode::INTERNAL_SERVER_ERROR, "oops".to_string()),
        ("/up.xml", StatusCode::OK, good),
    ])
    .await
}

async fn seed_watermark(store: &dyn StateStore, task: &TaskId, hours_ago: i64) {
    let st = ScanState {
        watermark_timestamp: Some(Utc::now() - Duration::hours(hours_ago)),
        ..ScanState::default()
    };
    store::save(store, &news_state_key(task), &st).await.unwrap();
}

#[tokio::test]
async fn failing_source_is_isolated_and_matching_item_is_novel() {
    let base = feed_server().await;
    let h = harness();
    let task = TaskId::from("main");
    seed_watermark(h.store.as_ref(), &task, 2).await;

    let feeds = vec![format!("{base}/down.xml"), format!("{base}/up.xml")];
    let report = run_news_scan(&h.env, &task, &feeds, &detector(), Utc::now())
        .await
        .unwrap();

    assert_eq!(report.per_source_stats.len(), 2);
    assert!(!report.per_source_stats[0].ok);
    assert_eq!(report.per_source_stats[0].http_status, Some(500));
    assert!(report.per_source_stats[1].ok);
    assert_eq!(report.per_source_stats[1].item_count, 3);
    assert_eq!(report.failed_sources, 1);
    assert!(!report.watermark_advanced, "an unanswered feed keeps its window open");

    // unmatched and undated items never become candidates
    assert_eq!(report.matched, 1);
    assert_eq!(report.novel.len(), 1);
    assert_eq!(report.novel[0].item.title, "Apple (AAPL) beats estimates");
    assert_eq!(report.sent, 1);

    let msgs = h.notifier.messages();
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].contains("[AAPL]"));
    assert!(msgs[0].contains("Shares of AAPL rose & held."));
    assert!(!msgs[0].contains("<b>"));
}

#[tokio::test]
async fn outage_holds_the_watermark_until_feeds_recover() {
    let published = Utc::now() - Duration::hours(1);
    let body = rss(&[RssItem {
        title: "AAPL guidance raised",
        description: "Posted while the feed was down.",
        link: "https://news.example/aapl-guidance",
        published: Some(published),
    }]);
    let (base, down) = serve_switchable("/feed.xml", body).await;
    let h = harness();
    let task = TaskId::from("main");
    seed_watermark(h.store.as_ref(), &task, 2).await;
    let feeds = vec![format!("{base}/feed.xml")];

    let outage = run_news_scan(&h.env, &task, &feeds, &detector(), Utc::now())
        .await
        .unwrap();
    assert!(!outage.per_source_stats[0].ok);
    assert_eq!(outage.failed_sources, 1);
    assert!(!outage.watermark_advanced);
    let st: ScanState = store::load_or_default(h.store.as_ref(), &news_state_key(&task)).await;
    assert!(st.watermark_timestamp.unwrap() < published);

    down.store(false, Ordering::SeqCst);
    let recovery = run_news_scan(&h.env, &task, &feeds, &detector(), Utc::now())
        .await
        .unwrap();
    assert_eq!((recovery.matched, recovery.novel.len(), recovery.sent), (1, 1, 1));
    assert!(recovery.watermark_advanced);
    assert_eq!(h.notifier.messages().len(), 1);
}

#[tokio::test]
async fn repeated_item_is_not_renotified() {
    let base = feed_server().await;
    let h = harness();
    let task = TaskId::from("main");
    let feeds = vec![format!("{base}/up.xml")];

    let first = run_news_scan(&h.env, &task, &feeds, &detector(), Utc::now())
        .await
        .unwrap();
    assert_eq!(first.sent, 1);

    let second = run_news_scan(&h.env, &task, &feeds, &detector(), Utc::now())
        .await
        .unwrap();
    assert!(second.novel.is_empty());
    assert_eq!(second.seen_keys, first.seen_keys);
    assert_eq!(h.notifier.messages().len(), 1);
    assert!(second.effective_since >= first.effective_since);
}

#[tokio::test]
async fn failed_dispatch_is_retried_next_run() {
    let base = feed_server().await;
    let task = TaskId::from("main");
    let feeds = vec![format!("{base}/up.xml")];

    let h = harness_with(Arc::new(RecordingNotifier::failing_on("AAPL")));
    let report = run_news_scan(&h.env, &task, &feeds, &detector(), Utc::now())
        .await
        .unwrap();
    assert_eq!((report.sent, report.failed), (0, 1));
    assert!(!report.watermark_advanced);
    assert_eq!(report.seen_keys, 0);

    // same store, working notifier
    let mut env = h.env.clone();
    let ok = Arc::new(RecordingNotifier::new());
    env.news_notifier = ok.clone();
    let retry = run_news_scan(&env, &task, &feeds, &detector(), Utc::now())
        .await
        .unwrap();
    assert_eq!(retry.sent, 1);
    assert_eq!(ok.messages().len(), 1);
}

#[tokio::test]
async fn unsaved_state_means_no_silent_loss() {
    let base = feed_server().await;
    let h = harness();
    let task = TaskId::from("main");
    let feeds = vec![format!("{base}/up.xml")];

    h.store.fail_writes.store(true, Ordering::SeqCst);
    let err = run_news_scan(&h.env, &task, &feeds, &detector(), Utc::now()).await;
    assert!(err.is_err());
    assert!(h.store.inner.get(&news_state_key(&task)).is_none());

    h.store.fail_writes.store(false, Ordering::SeqCst);
    let retry = run_news_scan(&h.env, &task, &feeds, &detector(), Utc::now())
        .await
        .unwrap();
    assert_eq!(retry.novel.len(), 1);
}

#[tokio::test]
async fn tasks_keep_separate_ledgers() {
    let base = feed_server().await;
    let h = harness();
    let feeds = vec![format!("{base}/up.xml")];

    for name in ["a", "b"] {
        let r = run_news_scan(&h.env, &TaskId::from(name), &feeds, &detector(), Utc::now())
            .await
            .unwrap();
        assert_eq!(r.sent, 1, "task {name}");
    }
    let st: ScanState = store::load_or_default(h.store.as_ref(), "news-a").await;
    let summary = st.last_scan_summary.unwrap();
    assert_eq!((summary.matched, summary.sent, summary.failed), (1, 1, 0));
    assert!(st.seen_keys.len() <= SEEN_KEYS_CAPACITY);
}
