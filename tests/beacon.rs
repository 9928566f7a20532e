// tests/beacon.rs
mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use common::{current_entry, harness, history, registry};
use filing_beacon::beacon::{Beacon, TickOutcome};
use filing_beacon::config::{BeaconPlan, TaskKind, TaskSpec};
use filing_beacon::registry::{IssuerSource, Registry};
use filing_beacon::scan::{FilingStatus, TaskReport};
use filing_beacon::schedule::{CounterPolicy, TaskId, Trigger};
use filing_beacon::sec::{CurrentEntry, FilingHistory, FilingSource};

/// Registry that tests can swap between ticks.
struct SwitchableIssuers(Mutex<Registry>);

impl IssuerSource for SwitchableIssuers {
    fn load(&self) -> Result<Registry> {
        Ok(self.0.lock().unwrap().clone())
    }
}

struct SlowFilings;

#[async_trait]
impl FilingSource for SlowFilings {
    async fn fetch_history(&self, cik10: &str) -> Result<FilingHistory> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(history(cik10, &[("10-Q", "slow-1")]))
    }

    async fn fetch_current(&self, _form: &str) -> Result<Vec<CurrentEntry>> {
        Ok(Vec::new())
    }

    async fn fetch_document(&self, url: &str) -> Result<String> {
        Ok(url.to_string())
    }
}

fn filings_only() -> BeaconPlan {
    BeaconPlan::default()
}

#[tokio::test]
async fn overlapping_tick_is_skipped() {
    let mut h = harness();
    h.env.filings = Arc::new(SlowFilings);
    let beacon = Beacon::new(h.env.clone(), Arc::new(registry(&[("AAPL", "320193")])), filings_only());

    let (a, b) = tokio::join!(beacon.tick(), beacon.tick());
    assert!(matches!(a, TickOutcome::Completed(_)));
    assert!(matches!(b, TickOutcome::Skipped));

    // the skipped tick did not advance the counter
    assert_eq!(beacon.status().await.polls, 1);
    assert!(matches!(beacon.tick().await, TickOutcome::Completed(_)));
}

#[tokio::test]
async fn tasks_follow_counter_positions() {
    let h = harness();
    h.filings.set("0000320193", history("320193", &[("10-Q", "q-1")]));
    let plan = BeaconPlan {
        counter: CounterPolicy::Modulo { period: 2 },
        tasks: vec![
            TaskSpec {
                id: TaskId::from("filings-even"),
                trigger: Trigger::At(0),
                kind: TaskKind::Filings,
            },
            TaskSpec {
                id: TaskId::from("filings-odd"),
                trigger: Trigger::At(1),
                kind: TaskKind::Filings,
            },
        ],
    };
    let beacon = Beacon::new(h.env.clone(), Arc::new(registry(&[("AAPL", "320193")])), plan);

    let mut seen = Vec::new();
    for _ in 0..4 {
        match beacon.tick().await {
            TickOutcome::Completed(r) => {
                assert_eq!(r.tasks.len(), 1);
                assert!(matches!(r.tasks[0].report, TaskReport::Filings(_)));
                seen.push((r.position, r.tasks[0].task.to_string()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(
        seen,
        vec![
            (0, "filings-even".to_string()),
            (1, "filings-odd".to_string()),
            (0, "filings-even".to_string()),
            (1, "filings-odd".to_string()),
        ]
    );
    // both tasks share the filings ledger: notified once
    assert_eq!(h.notifier.messages().len(), 1);
}

#[tokio::test]
async fn repeated_error_is_reported_once_and_success_resets() {
    let h = harness();
    h.filings.set("0000320193", history("320193", &[("10-Q", "q-1")]));
    let issuers = Arc::new(SwitchableIssuers(Mutex::new(Registry::default())));
    let beacon = Beacon::new(h.env.clone(), issuers.clone(), filings_only());

    for _ in 0..3 {
        match beacon.tick().await {
            TickOutcome::Failed(msg) => assert!(msg.contains("no tracked issuers")),
            other => panic!("unexpected {other:?}"),
        }
    }
    let errors: Vec<_> = h
        .notifier
        .messages()
        .into_iter()
        .filter(|m| m.starts_with("Polling error: "))
        .collect();
    assert_eq!(errors, vec!["Polling error: no tracked issuers configured".to_string()]);
    let failing = beacon.status().await;
    assert!(failing.last_error.is_some());
    assert!(failing.last_error_reported_at.is_some());

    *issuers.0.lock().unwrap() = registry(&[("AAPL", "320193")]);
    assert!(matches!(beacon.tick().await, TickOutcome::Completed(_)));
    let recovered = beacon.status().await;
    assert!(recovered.last_error.is_none());
    assert!(recovered.last_error_reported_at.is_none());

    *issuers.0.lock().unwrap() = Registry::default();
    beacon.tick().await;
    let errors = h
        .notifier
        .messages()
        .into_iter()
        .filter(|m| m.starts_with("Polling error: "))
        .count();
    assert_eq!(errors, 2);
}

#[tokio::test]
async fn heartbeat_every_n_polls() {
    let h = harness();
    h.filings.set("0000320193", history("320193", &[("8-K", "k-1")]));
    let beacon = Beacon::new(h.env.clone(), Arc::new(registry(&[("AAPL", "320193")])), filings_only())
        .with_heartbeat(2);

    for _ in 0..4 {
        beacon.tick().await;
    }
    let beats: Vec<_> = h
        .notifier
        .messages()
        .into_iter()
        .filter(|m| m.starts_with("Beacon state:"))
        .collect();
    assert_eq!(
        beats,
        vec![
            "Beacon state: polls=2, last tasks=filings".to_string(),
            "Beacon state: polls=4, last tasks=filings".to_string(),
        ]
    );
}

#[tokio::test]
async fn run_now_executes_one_task_without_moving_the_counter() {
    let h = harness();
    h.filings.set("0000320193", history("320193", &[("10-K", "k-9")]));
    let beacon = Beacon::new(h.env.clone(), Arc::new(registry(&[("AAPL", "320193")])), filings_only());

    let before = beacon.status().await.counter;
    assert!(matches!(beacon.run_now("filings").await, TickOutcome::Completed(_)));
    assert_eq!(beacon.status().await.counter, before);

    assert!(matches!(beacon.run_now("nope").await, TickOutcome::Failed(m) if m.contains("unknown scan task")));
}

#[tokio::test]
async fn current_task_only_looks_up_issuers_on_the_feed() {
    let h = harness();
    h.filings.set("0000320193", history("320193", &[("10-Q", "0000320193-25-000057")]));
    h.filings.set("0001045810", history("1045810", &[("10-Q", "0001045810-25-000207")]));
    h.filings.set_current(
        "10-Q",
        vec![current_entry("0001045810", "10-Q", Some("0001045810-25-000207"))],
    );
    h.filings.set_current("10-K", Vec::new());
    let plan = BeaconPlan {
        counter: CounterPolicy::Modulo { period: 1 },
        tasks: vec![TaskSpec {
            id: TaskId::from("latest"),
            trigger: Trigger::Always,
            kind: TaskKind::CurrentFilings {
                forms: vec!["10-Q".into(), "10-K".into()],
            },
        }],
    };
    let reg = registry(&[("AAPL", "320193"), ("NVDA", "1045810")]);
    let beacon = Beacon::new(h.env.clone(), Arc::new(reg), plan);

    let report = match beacon.tick().await {
        TickOutcome::Completed(r) => r,
        other => panic!("unexpected {other:?}"),
    };
    let TaskReport::Filings(filings) = &report.tasks[0].report else {
        panic!("expected a filings report");
    };
    assert_eq!(filings.results.len(), 1);
    assert_eq!(filings.get("NVDA").unwrap().status, FilingStatus::New);
    assert_eq!(h.filings.history_calls(), vec!["0001045810".to_string()]);

    let events = beacon.filing_events(100).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].symbol, "NVDA");
}
