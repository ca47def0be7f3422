//! Raw-telegram fan-out: an optional outbound webhook receiving every
//! successfully decoded XML body. Fire-and-forget with a 5 s budget.

use std::time::Duration;

use tracing::warn;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Default)]
pub struct Fanout {
    webhook_url: Option<String>,
}

impl Fanout {
    pub fn new(webhook_url: Option<String>) -> Self {
        Self { webhook_url }
    }

    /// Spawn delivery of one decoded telegram body. The returned handle
    /// lets the caller bound the join; delivery errors only warn.
    pub fn dispatch(&self, xml: String) -> tokio::task::JoinHandle<()> {
        let webhook_url = self.webhook_url.clone();
        tokio::spawn(async move {
            let Some(url) = webhook_url else { return };
            let client = match reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build() {
                Ok(client) => client,
                Err(e) => {
                    warn!(error = %e, "failed to build webhook client");
                    return;
                }
            };
            match client
                .post(&url)
                .header("Content-Type", "application/xml")
                .body(xml)
                .send()
                .await
            {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), "webhook refused telegram");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "failed to post telegram to webhook"),
            }
        })
    }
}
