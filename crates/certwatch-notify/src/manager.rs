use std::time::Duration;

use certwatch_core::config::NotifiersConfig;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::notifier::Notifier;
use crate::types::Notification;
use crate::wecom::WeComNotifier;
use crate::webhook::WebhookNotifier;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Fans one notification out to every registered backend. A backend that
/// errors is logged and skipped; the others still get the message.
#[derive(Default)]
pub struct NotificationManager {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotificationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the manager from the `[notifiers]` config section. Sections
    /// that are absent simply contribute no backend.
    pub fn from_config(config: &NotifiersConfig) -> Result<Self> {
        let mut manager = Self::new();
        if config.wecom.is_none() && config.webhook.is_none() {
            return Ok(manager);
        }

        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        if let Some(wecom) = &config.wecom {
            manager.register(Box::new(WeComNotifier::new(
                client.clone(),
                &wecom.webhook_url,
            )));
        }
        if let Some(webhook) = &config.webhook {
            manager.register(Box::new(WebhookNotifier::new(client.clone(), &webhook.url)));
        }
        Ok(manager)
    }

    pub fn register(&mut self, notifier: Box<dyn Notifier>) {
        info!(backend = notifier.name(), "notification backend registered");
        self.notifiers.push(notifier);
    }

    pub fn backends(&self) -> usize {
        self.notifiers.len()
    }

    /// Deliver `note` everywhere. Never fails; per-backend errors are logged.
    pub async fn dispatch(&self, note: &Notification) {
        if self.notifiers.is_empty() {
            debug!("no notification backends configured");
            return;
        }

        info!(
            backends = self.notifiers.len(),
            status = %note.status,
            "dispatching notification"
        );
        for notifier in &self.notifiers {
            match notifier.send(note).await {
                Ok(()) => info!(backend = notifier.name(), "notification delivered"),
                Err(e) => {
                    error!(backend = notifier.name(), error = %e, "notification delivery failed")
                }
            }
        }
    }
}
