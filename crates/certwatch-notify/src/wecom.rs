use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{NotifyError, Result};
use crate::notifier::Notifier;
use crate::types::{Notification, NotifyStatus};

/// WeCom group-robot backend. Posts a markdown card to the robot webhook and
/// checks the `errcode` the API returns in its 200 response.
pub struct WeComNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl WeComNotifier {
    pub fn new(client: reqwest::Client, webhook_url: impl Into<String>) -> Self {
        Self {
            client,
            webhook_url: webhook_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WeComResponse {
    errcode: i64,
    #[serde(default)]
    errmsg: Option<String>,
}

#[async_trait]
impl Notifier for WeComNotifier {
    fn name(&self) -> &str {
        "wecom"
    }

    async fn send(&self, note: &Notification) -> Result<()> {
        let payload = serde_json::json!({
            "msgtype": "markdown",
            "markdown": { "content": markdown_content(note) },
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        let body: WeComResponse = response.json().await?;
        if body.errcode != 0 {
            return Err(NotifyError::Rejected {
                backend: "wecom".to_string(),
                message: body
                    .errmsg
                    .unwrap_or_else(|| format!("errcode {}", body.errcode)),
            });
        }
        debug!("wecom accepted the message");
        Ok(())
    }
}

/// The markdown card body. Details are flattened to one line since WeCom
/// renders each `>` quote as a single row.
fn markdown_content(note: &Notification) -> String {
    let (title, color, summary) = match note.status {
        NotifyStatus::Success => (
            "✅ Certificate automation succeeded",
            "info",
            format!(
                "Scheduled certificate maintenance for **{}** completed.",
                note.domain
            ),
        ),
        NotifyStatus::Failure => (
            "❌ Certificate automation failed",
            "warning",
            format!(
                "Certificate renewal for **{}** failed, check the service logs.",
                note.domain
            ),
        ),
    };

    let mut content = format!(
        "# {title}\n\
         > Domain: <font color=\"info\">{}</font>\n\
         > Time: <font color=\"comment\">{}</font>\n\
         > Status: <font color=\"{color}\">{summary}</font>\n",
        note.domain,
        note.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    let details = note.details.replace('\n', " ");
    let details = details.trim();
    if !details.is_empty() {
        content.push_str(&format!(
            "> Details: <font color=\"comment\">{details}</font>\n"
        ));
    }
    if let Some(next_run) = note.next_run {
        content.push_str(&format!(
            "> Next check: <font color=\"comment\">{}</font>\n",
            next_run.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    content
}
