// src/config.rs
//! Process configuration: environment variables plus the TOML schedule file.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::schedule::{CounterPolicy, CycleCounter, Schedule, TaskId, Trigger};
use crate::sec::client::DEFAULT_USER_AGENT;
use crate::sec::current::DEFAULT_CURRENT_FORMS;

pub const MIN_POLL_MS: u64 = 1_000;
pub const DEFAULT_POLL_MS: u64 = 4_000;
pub const DEFAULT_HEARTBEAT_EVERY: u64 = 25;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_TRACKED_ISSUERS_PATH: &str = "data/edgar_by_tickets_enriched.json";
pub const DEFAULT_STATE_DIR: &str = "data/state";
pub const DEFAULT_CONFIG_PATH: &str = "config/beacon.toml";
pub const FILINGS_TASK: &str = "filings";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),
    #[error("poll interval must be at least 1000ms, got `{0}`")]
    InvalidPollInterval(String),
    #[error("no tracked issuers configured")]
    NoTrackedIssuers,
    #[error("schedule defines no scan tasks")]
    NoTasks,
    #[error("news task `{0}` has no feeds")]
    NoFeeds(String),
    #[error("unknown scan task `{0}`")]
    UnknownTask(String),
    #[error("scan task `{0}` is defined twice")]
    DuplicateTask(String),
    #[error("scan task id `{0}` may only use letters, digits, `-` and `_`")]
    InvalidTaskId(String),
    #[error("scan task `{task}` is bound to position {position}, which the counter never reaches")]
    TriggerOutOfRange { task: String, position: u32 },
    #[error("file not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid {}: {message}", .path.display())]
    Invalid { path: PathBuf, message: String },
}

/// Everything read from the environment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `None` only in dry-run mode.
    pub webhook_url: Option<String>,
    pub news_webhook_url: Option<String>,
    pub sec_user_agent: String,
    pub include_amendments: bool,
    pub poll_ms: u64,
    pub tracked_issuers_path: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub status_addr: Option<String>,
    pub beacon_id: String,
    pub heartbeat_every: u64,
    pub http_timeout_secs: u64,
    pub archive_filings: bool,
    pub dry_run: bool,
}

fn flag(v: Option<String>, default: bool) -> bool {
    match v.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
        Some(s) if matches!(s.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(s) if matches!(s.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let dry_run = flag(var("DRY_RUN"), false);
        let webhook_url = var("DISCORD_WEBHOOK_URL");
        if webhook_url.is_none() && !dry_run {
            return Err(ConfigError::MissingEnv("DISCORD_WEBHOOK_URL"));
        }

        let poll_ms = match var("BEACON_POLL_MS") {
            None => DEFAULT_POLL_MS,
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) if ms >= MIN_POLL_MS => ms,
                _ => return Err(ConfigError::InvalidPollInterval(raw)),
            },
        };

        let heartbeat_every = var("HEARTBEAT_EVERY")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_HEARTBEAT_EVERY);
        let http_timeout_secs = var("HTTP_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|&s: &u64| s > 0)
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);

        Ok(Self {
            webhook_url,
            news_webhook_url: var("DISCORD_WEBHOOK_URL2"),
            sec_user_agent: var("SEC_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            include_amendments: flag(var("INCLUDE_AMENDMENTS"), true),
            poll_ms,
            tracked_issuers_path: var("TRACKED_ISSUERS_PATH")
                .unwrap_or_else(|| DEFAULT_TRACKED_ISSUERS_PATH.to_string())
                .into(),
            state_dir: var("STATE_DIR")
                .unwrap_or_else(|| DEFAULT_STATE_DIR.to_string())
                .into(),
            config_path: var("BEACON_CONFIG_PATH")
                .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
                .into(),
            status_addr: var("STATUS_ADDR"),
            beacon_id: var("BEACON_ID").unwrap_or_else(|| "filing-beacon".to_string()),
            heartbeat_every,
            http_timeout_secs,
            archive_filings: flag(var("ARCHIVE_FILINGS"), true),
            dry_run,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Submissions lookup for every tracked issuer.
    Filings,
    /// Submissions lookup only for issuers on the "latest filings" feeds.
    CurrentFilings { forms: Vec<String> },
    News { feeds: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub id: TaskId,
    pub trigger: Trigger,
    pub kind: TaskKind,
}

/// Counter policy and the scan tasks bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconPlan {
    pub counter: CounterPolicy,
    pub tasks: Vec<TaskSpec>,
}

impl Default for BeaconPlan {
    /// Filings every tick, no news tasks.
    fn default() -> Self {
        Self {
            counter: CounterPolicy::default(),
            tasks: vec![TaskSpec {
                id: TaskId::from(FILINGS_TASK),
                trigger: Trigger::Always,
                kind: TaskKind::Filings,
            }],
        }
    }
}

impl BeaconPlan {
    pub fn schedule(&self) -> Schedule {
        self.tasks
            .iter()
            .fold(Schedule::new(), |s, t| s.bind(t.id.clone(), t.trigger))
    }

    pub fn initial_counter(&self) -> CycleCounter {
        CycleCounter::new(self.counter)
    }

    pub fn task(&self, id: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.id.as_str() == id)
    }

    /// Default plan when `path` does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(target: "beacon", path = %path.display(), "no schedule file, using default plan");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = read(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, base).map_err(|e| match e {
            ConfigError::Invalid { path: p, message } if p.as_os_str() == "<schedule>" => ConfigError::Invalid {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    /// `feeds_file` paths are resolved against `base`.
    pub fn parse(content: &str, base: &Path) -> Result<Self, ConfigError> {
        let raw: PlanFile = toml::from_str(content).map_err(|e| ConfigError::Invalid {
            path: PathBuf::from("<schedule>"),
            message: e.to_string(),
        })?;

        let counter = raw.counter.unwrap_or_default();
        let mut seen = HashSet::new();
        let mut tasks = Vec::with_capacity(raw.tasks.len());

        for row in raw.tasks {
            let id = row.id.trim().to_string();
            if !is_valid_task_id(&id) {
                return Err(ConfigError::InvalidTaskId(id));
            }
            if !seen.insert(id.clone()) {
                return Err(ConfigError::DuplicateTask(id));
            }
            let trigger = row.trigger(&id)?;
            if let Trigger::At(position) = trigger {
                if !reachable(counter, position) {
                    return Err(ConfigError::TriggerOutOfRange { task: id, position });
                }
            }
            let kind = match row.kind {
                RawKind::Filings => TaskKind::Filings,
                RawKind::Current => {
                    let forms = clean_feeds(row.forms.iter().map(|f| f.to_ascii_uppercase()).collect());
                    let forms = if forms.is_empty() {
                        DEFAULT_CURRENT_FORMS.iter().map(|f| f.to_string()).collect()
                    } else {
                        forms
                    };
                    TaskKind::CurrentFilings { forms }
                }
                RawKind::News => {
                    let mut feeds = row.feeds;
                    if let Some(file) = &row.feeds_file {
                        feeds.extend(load_feed_list(&base.join(file))?);
                    }
                    let feeds = clean_feeds(feeds);
                    if feeds.is_empty() {
                        return Err(ConfigError::NoFeeds(id));
                    }
                    TaskKind::News { feeds }
                }
            };
            tasks.push(TaskSpec {
                id: TaskId(id),
                trigger,
                kind,
            });
        }

        if tasks.is_empty() {
            return Err(ConfigError::NoTasks);
        }
        Ok(Self { counter, tasks })
    }
}

/// Task ids name state files, so they stay filename-safe as written.
fn is_valid_task_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn reachable(policy: CounterPolicy, position: u32) -> bool {
    match policy {
        CounterPolicy::Triangle { min, max } => position >= min.min(max) && position <= max.max(min),
        CounterPolicy::Modulo { period } => position < period.max(1),
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::MissingFile(path.to_path_buf())
        } else {
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// JSON array of feed URLs.
pub fn load_feed_list(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = read(path)?;
    let list: Vec<String> = serde_json::from_str(&content).map_err(|e| ConfigError::Invalid {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(clean_feeds(list))
}

/// Trim, drop blanks, de-duplicate keeping the first occurrence.
pub fn clean_feeds(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

#[derive(Debug, Deserialize)]
struct PlanFile {
    #[serde(default)]
    counter: Option<CounterPolicy>,
    #[serde(default)]
    tasks: Vec<TaskRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawKind {
    Filings,
    Current,
    News,
}

#[derive(Debug, Deserialize)]
struct TaskRow {
    id: String,
    kind: RawKind,
    #[serde(default)]
    trigger: Option<String>,
    #[serde(default)]
    at: Option<u32>,
    #[serde(default)]
    feeds: Vec<String>,
    #[serde(default)]
    feeds_file: Option<PathBuf>,
    #[serde(default)]
    forms: Vec<String>,
}

impl TaskRow {
    fn trigger(&self, id: &str) -> Result<Trigger, ConfigError> {
        match (&self.at, self.trigger.as_deref().map(str::trim)) {
            (Some(p), None) => Ok(Trigger::At(*p)),
            (None, None) | (None, Some("always")) => Ok(Trigger::Always),
            (Some(_), Some(_)) => Err(ConfigError::Invalid {
                path: PathBuf::from("<schedule>"),
                message: format!("task `{id}` sets both `trigger` and `at`"),
            }),
            (None, Some(other)) => Err(ConfigError::Invalid {
                path: PathBuf::from("<schedule>"),
                message: format!("task `{id}` has unknown trigger `{other}`"),
            }),
        }
    }
}
