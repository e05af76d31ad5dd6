use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::notifier::Notifier;
use crate::types::Notification;

/// Generic backend: the notification is POSTed as-is in JSON, for receivers
/// like ntfy bridges or home-grown dashboards.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, note: &Notification) -> Result<()> {
        self.client
            .post(&self.url)
            .json(note)
            .send()
            .await?
            .error_for_status()?;
        debug!(url = %self.url, "webhook accepted the message");
        Ok(())
    }
}
