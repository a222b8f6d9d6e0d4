//! Fire-and-forget notification sink (spec §6: `Notify(msg)`).
//!
//! Posts `{"text": "<message>"}` to the configured webhook. Best effort: a
//! failure is logged and swallowed, the same policy `db_storage.rs` applies
//! to its own best-effort metadata writes, never bubbled to the caller
//! since a notification failure must not abort a job.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::warn;

pub struct Notifier {
    client: Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build notify http client");
        Self { client, webhook_url }
    }

    /// Best-effort POST; never surfaces an error to the caller.
    pub async fn notify(&self, message: impl Into<String>) {
        let Some(url) = &self.webhook_url else {
            return;
        };
        let message = message.into();
        let result = self
            .client
            .post(url)
            .json(&json!({ "text": message }))
            .send()
            .await;

        if let Err(e) = result {
            warn!(error = %e, "notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_webhook_configured_is_a_silent_noop() {
        let notifier = Notifier::new(None);
        notifier.notify("should not attempt a send").await;
    }

    #[tokio::test]
    async fn unreachable_webhook_does_not_panic_or_propagate() {
        let notifier = Notifier::new(Some("http://127.0.0.1:1".to_string()));
        notifier.notify("best effort").await;
    }
}
