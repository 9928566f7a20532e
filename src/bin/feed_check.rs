//! Fetch and parse the given feeds once, print items and per-source stats as JSON.
//!
//! Usage: `feed_check <url>...`

use std::time::Duration;

use anyhow::{bail, Result};
use filing_beacon::ingest::FeedFetcher;
use filing_beacon::sec::client::DEFAULT_USER_AGENT;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        bail!("usage: feed_check <url>...");
    }

    let ua = std::env::var("SEC_USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());
    let fetcher = FeedFetcher::new(&ua, Duration::from_secs(20))?;
    let outcome = fetcher.fetch_all(&urls).await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
