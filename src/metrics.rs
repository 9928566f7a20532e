use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("beacon_feed_items_total", "Items parsed from feed documents.");
        describe_counter!("beacon_feed_errors_total", "Feed sources that failed to fetch.");
        describe_histogram!("beacon_feed_parse_ms", "Feed parse time in milliseconds.");
        describe_counter!(
            "beacon_novel_hits_total",
            "News hits that passed the dedup ledger."
        );
        describe_counter!(
            "beacon_notifications_sent_total",
            "Messages delivered to the webhook."
        );
        describe_counter!(
            "beacon_notify_errors_total",
            "Webhook deliveries that failed after retries."
        );
        describe_counter!("beacon_filings_new_total", "New periodic filings notified.");
        describe_counter!("beacon_ticks_total", "Scheduler ticks that ran.");
        describe_counter!(
            "beacon_ticks_skipped_total",
            "Ticks skipped because the previous one was still running."
        );
        describe_gauge!("beacon_last_tick_ts", "Unix ts of the last finished tick.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already set.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }
}
