// src/notify/error_gate.rs
use chrono::{DateTime, Utc};

/// Alert-storm gate for tick errors.
/// - A new error message is reported once.
/// - The same message on later ticks is suppressed.
/// - A successful tick clears the gate, so a recurrence is reported again.
#[derive(Debug, Clone, Default)]
pub struct ErrorGate {
    last_error: Option<String>,
    last_reported_at: Option<DateTime<Utc>>,
}

impl ErrorGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Does NOT mutate state.
    pub fn should_report(&self, message: &str) -> bool {
        self.last_error.as_deref() != Some(message)
    }

    /// Remember `message` as the current error whether or not it was sent,
    /// so a failing send does not cause a retry storm either.
    pub fn record(&mut self, message: &str, now: DateTime<Utc>) {
        if self.should_report(message) {
            self.last_reported_at = Some(now);
        }
        self.last_error = Some(message.to_string());
    }

    pub fn clear(&mut self) {
        self.last_error = None;
        self.last_reported_at = None;
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_reported_at(&self) -> Option<DateTime<Utc>> {
        self.last_reported_at
    }
}
