// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod beacon;
pub mod config;
pub mod dedup;
pub mod detect;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod registry;
pub mod scan;
pub mod schedule;
pub mod sec;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::beacon::{Beacon, TickOutcome};
pub use crate::config::{AppConfig, ConfigError};
pub use crate::notify::Notifier;
