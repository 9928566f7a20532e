//! Filing Beacon: binary entrypoint.
//! Loads config, starts the optional status router, and runs the poll loop.
//!
//! See `README.md` for configuration.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use filing_beacon::api::{self, AppState};
use filing_beacon::metrics::Metrics;
use filing_beacon::{AppConfig, Beacon};

/// Compact logs by default, JSON lines when `LOG_FORMAT=json`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env().context("reading configuration")?;
    let metrics = Metrics::init()?;
    let beacon = Arc::new(Beacon::from_config(&cfg).context("building beacon")?);

    tracing::info!(
        target: "beacon",
        id = %cfg.beacon_id,
        poll_ms = cfg.poll_ms,
        tasks = beacon.plan().tasks.len(),
        dry_run = cfg.dry_run,
        "starting"
    );
    beacon.announce_startup(&cfg.beacon_id, cfg.poll_ms).await;

    if let Some(addr) = &cfg.status_addr {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding status router on {addr}"))?;
        let app = api::router(AppState::new(beacon.clone()).with_metrics(metrics.handle.clone()));
        tracing::info!(target: "beacon", %addr, "status router listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(target: "beacon", error = %e, "status router stopped");
            }
        });
    }

    tokio::select! {
        _ = beacon.clone().run(Duration::from_millis(cfg.poll_ms)) => {}
        res = tokio::signal::ctrl_c() => {
            res.context("waiting for ctrl-c")?;
            tracing::info!(target: "beacon", "shutting down");
        }
    }
    Ok(())
}
