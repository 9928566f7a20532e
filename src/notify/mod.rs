//! Notification dispatch.
//!
//! The scan core only needs `send(text)`; whether that is a webhook, a log
//! line, or an in-memory recorder is decided at wiring time.

pub mod discord;
pub mod error_gate;
pub mod message;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Mutex;

pub use discord::DiscordNotifier;
pub use error_gate::ErrorGate;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Dry-run sink: logs instead of posting.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    pub channel: String,
}

impl LogNotifier {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        tracing::info!(target: "notify", channel = %self.channel, "{text}");
        Ok(())
    }
}

/// Keeps every delivered message. Messages containing `fail_when_contains`
/// are rejected and not recorded.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    fail_when_contains: Option<String>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(needle: impl Into<String>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_when_contains: Some(needle.into()),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        if let Some(needle) = &self.fail_when_contains {
            if text.contains(needle.as_str()) {
                return Err(anyhow!("recording notifier rejected message"));
            }
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(text.to_string());
        Ok(())
    }
}

/// Cut to at most `max` chars, never inside a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
