use super::{truncate_chars, Notifier};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Discord rejects content over 2000 chars.
pub const MAX_CONTENT_CHARS: usize = 1900;
const MAX_ATTEMPTS: u8 = 3;

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("building webhook http client")?;
        Ok(Self {
            webhook,
            client,
            timeout: Duration::from_secs(5),
        })
    }

    /// Per-attempt timeout; 0 is read as 1s.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs.max(1));
        self
    }

    pub async fn post(&self, text: &str) -> Result<()> {
        let payload = DiscordWebhookPayload {
            content: truncate_chars(text, MAX_CONTENT_CHARS),
        };

        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("Discord webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("Discord webhook request failed: {e}"),
            };

            if attempt >= MAX_ATTEMPTS {
                metrics::counter!("beacon_notify_errors_total").increment(1);
                return Err(err);
            }
            tracing::debug!(target: "notify", attempt, error = %err, "webhook retry");
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        self.post(text).await?;
        metrics::counter!("beacon_notifications_sent_total").increment(1);
        Ok(())
    }
}

#[derive(Serialize)]
struct DiscordWebhookPayload<'a> {
    content: &'a str,
}
