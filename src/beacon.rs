// src/beacon.rs
//! Tick runner: guard, counter, registry reload, scan tasks, error reporting.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::{self, MissedTickBehavior};

use crate::config::{AppConfig, BeaconPlan, ConfigError};
use crate::dedup::{FilingEvent, FilingState};
use crate::ingest::FeedFetcher;
use crate::notify::{message, DiscordNotifier, ErrorGate, LogNotifier, Notifier};
use crate::registry::{IssuerSource, RegistryFile};
use crate::scan::{run_task, ScanEnv, TaskReport, FILINGS_STATE_KEY};
use crate::schedule::{CycleCounter, Schedule, TaskId, TickGuard};
use crate::sec::EdgarClient;
use crate::store::{self, JsonFileStore};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutcome {
    pub task: TaskId,
    pub report: TaskReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub at: DateTime<Utc>,
    /// Counter position the tasks were selected for.
    pub position: u32,
    pub tasks: Vec<TaskOutcome>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// Another tick was still running.
    Skipped,
    Completed(TickReport),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeaconStatus {
    pub counter: CycleCounter,
    pub polls: u64,
    pub running: bool,
    pub last_tasks: Vec<TaskId>,
    pub last_report: Option<TickReport>,
    pub last_error: Option<String>,
    /// When the current error was sent out.
    pub last_error_reported_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct RunnerState {
    counter: CycleCounter,
    polls: u64,
    last_tasks: Vec<TaskId>,
    last_report: Option<TickReport>,
    gate: ErrorGate,
}

pub struct Beacon {
    env: ScanEnv,
    issuers: Arc<dyn IssuerSource>,
    plan: BeaconPlan,
    schedule: Schedule,
    guard: TickGuard,
    state: Mutex<RunnerState>,
    heartbeat_every: u64,
}

impl Beacon {
    pub fn new(env: ScanEnv, issuers: Arc<dyn IssuerSource>, plan: BeaconPlan) -> Self {
        crate::metrics::ensure_metrics_described();
        let schedule = plan.schedule();
        let counter = plan.initial_counter();
        Self {
            env,
            issuers,
            plan,
            schedule,
            guard: TickGuard::new(),
            state: Mutex::new(RunnerState {
                counter,
                polls: 0,
                last_tasks: Vec::new(),
                last_report: None,
                gate: ErrorGate::new(),
            }),
            heartbeat_every: 0,
        }
    }

    /// Heartbeat every `n` polls; 0 disables it.
    pub fn with_heartbeat(mut self, n: u64) -> Self {
        self.heartbeat_every = n;
        self
    }

    /// Wire the production collaborators from the environment config.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let timeout = Duration::from_secs(cfg.http_timeout_secs);
        let plan = BeaconPlan::load_or_default(&cfg.config_path)?;

        let (notifier, news_notifier): (Arc<dyn Notifier>, Arc<dyn Notifier>) =
            match (&cfg.webhook_url, cfg.dry_run) {
                (Some(url), false) => {
                    let discord = |url: &String| -> Result<DiscordNotifier> {
                        Ok(DiscordNotifier::new(url.clone())?.with_timeout(cfg.http_timeout_secs))
                    };
                    let primary: Arc<dyn Notifier> = Arc::new(discord(url)?);
                    let news: Arc<dyn Notifier> = match &cfg.news_webhook_url {
                        Some(url2) => Arc::new(discord(url2)?),
                        None => primary.clone(),
                    };
                    (primary, news)
                }
                (None, false) => return Err(ConfigError::MissingEnv("DISCORD_WEBHOOK_URL").into()),
                (_, true) => (
                    Arc::new(LogNotifier::new("primary")),
                    Arc::new(LogNotifier::new("news")),
                ),
            };

        let env = ScanEnv {
            fetcher: FeedFetcher::new(&cfg.sec_user_agent, timeout)?,
            filings: Arc::new(EdgarClient::new(&cfg.sec_user_agent, timeout)?),
            store: Arc::new(JsonFileStore::new(&cfg.state_dir)),
            notifier,
            news_notifier,
            include_amendments: cfg.include_amendments,
            archive_documents: cfg.archive_filings,
        };
        let issuers = Arc::new(RegistryFile::new(&cfg.tracked_issuers_path));
        Ok(Self::new(env, issuers, plan).with_heartbeat(cfg.heartbeat_every))
    }

    pub fn plan(&self) -> &BeaconPlan {
        &self.plan
    }

    pub async fn announce_startup(&self, beacon_id: &str, poll_ms: u64) {
        if let Err(e) = self.env.notifier.send(&message::startup(beacon_id, poll_ms)).await {
            tracing::warn!(target: "beacon", error = %format!("{e:#}"), "startup message failed");
        }
    }

    /// One scheduler tick. Overlapping calls are skipped, not queued.
    pub async fn tick(&self) -> TickOutcome {
        let Some(_permit) = self.guard.try_begin() else {
            tracing::debug!(target: "beacon", "tick still running, skipping");
            counter!("beacon_ticks_skipped_total").increment(1);
            return TickOutcome::Skipped;
        };

        let (tasks, position) = {
            let mut st = self.state.lock().await;
            st.polls += 1;
            let position = st.counter.position;
            let (tasks, next) = self.schedule.next_tasks(st.counter);
            st.counter = next;
            (tasks, position)
        };

        let result = self.run_tasks(&tasks, position).await;
        counter!("beacon_ticks_total").increment(1);
        gauge!("beacon_last_tick_ts").set(Utc::now().timestamp() as f64);
        self.finish(tasks, result).await
    }

    /// Run a single task right away, outside the counter's rotation.
    pub async fn run_now(&self, task: &str) -> TickOutcome {
        let Some(_permit) = self.guard.try_begin() else {
            return TickOutcome::Skipped;
        };
        let position = self.state.lock().await.counter.position;
        let tasks = vec![TaskId::from(task)];
        let result = self.run_tasks(&tasks, position).await;
        self.finish(tasks, result).await
    }

    async fn run_tasks(&self, tasks: &[TaskId], position: u32) -> Result<TickReport> {
        let started = Instant::now();
        let now = Utc::now();

        let registry = self.issuers.load().context("loading tracked issuers")?;
        if registry.is_empty() {
            return Err(ConfigError::NoTrackedIssuers.into());
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        for id in tasks {
            let spec = self
                .plan
                .task(id.as_str())
                .ok_or_else(|| ConfigError::UnknownTask(id.to_string()))?;
            let report = run_task(&self.env, spec, &registry, now)
                .await
                .with_context(|| format!("scan task `{id}`"))?;
            outcomes.push(TaskOutcome {
                task: id.clone(),
                report,
            });
        }

        Ok(TickReport {
            at: now,
            position,
            tasks: outcomes,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn finish(&self, tasks: Vec<TaskId>, result: Result<TickReport>) -> TickOutcome {
        let mut outgoing = Vec::new();
        let outcome = {
            let mut st = self.state.lock().await;
            st.last_tasks = tasks;
            match result {
                Ok(report) => {
                    st.gate.clear();
                    st.last_report = Some(report.clone());
                    tracing::info!(
                        target: "beacon",
                        polls = st.polls,
                        position = report.position,
                        tasks = report.tasks.len(),
                        sent = report.tasks.iter().map(|t| t.report.sent()).sum::<usize>(),
                        elapsed_ms = report.elapsed_ms,
                        "tick done"
                    );
                    if self.heartbeat_every > 0 && st.polls % self.heartbeat_every == 0 {
                        let names: Vec<String> = st.last_tasks.iter().map(|t| t.to_string()).collect();
                        outgoing.push(message::heartbeat(st.polls, &names));
                    }
                    TickOutcome::Completed(report)
                }
                Err(e) => {
                    let msg = format!("{e:#}");
                    tracing::error!(target: "beacon", error = %msg, "tick failed");
                    if st.gate.should_report(&msg) {
                        outgoing.push(message::tick_error(&msg));
                    }
                    st.gate.record(&msg, Utc::now());
                    TickOutcome::Failed(msg)
                }
            }
        };

        for text in outgoing {
            if let Err(e) = self.env.notifier.send(&text).await {
                tracing::warn!(target: "beacon", error = %format!("{e:#}"), "status message failed");
            }
        }
        outcome
    }

    pub async fn status(&self) -> BeaconStatus {
        let st = self.state.lock().await;
        BeaconStatus {
            counter: st.counter,
            polls: st.polls,
            running: self.guard.is_running(),
            last_tasks: st.last_tasks.clone(),
            last_report: st.last_report.clone(),
            last_error: st.gate.last_error().map(str::to_string),
            last_error_reported_at: st.gate.last_reported_at(),
        }
    }

    /// Newest filing events from the shared filings ledger.
    pub async fn filing_events(&self, limit: usize) -> Vec<FilingEvent> {
        let state: FilingState = store::load_or_default(self.env.store.as_ref(), FILINGS_STATE_KEY).await;
        state.recent_events(limit).to_vec()
    }

    /// Fire a tick every `period`. Each tick runs on its own task so a slow
    /// tick makes the following ones skip instead of piling up.
    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let beacon = Arc::clone(&self);
            tokio::spawn(async move {
                beacon.tick().await;
            });
        }
    }
}
