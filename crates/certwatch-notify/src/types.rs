use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse result a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyStatus {
    Success,
    Failure,
}

impl std::fmt::Display for NotifyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyStatus::Success => write!(f, "success"),
            NotifyStatus::Failure => write!(f, "failure"),
        }
    }
}

/// One cycle's outcome summary, as handed to every backend.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub status: NotifyStatus,
    pub domain: String,
    pub details: String,
    /// When the scheduler will look at the certificate again.
    pub next_run: Option<DateTime<Utc>>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        status: NotifyStatus,
        domain: impl Into<String>,
        details: impl Into<String>,
        next_run: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            status,
            domain: domain.into(),
            details: details.into(),
            next_run,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&NotifyStatus::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(
            serde_json::to_string(&NotifyStatus::Failure).unwrap(),
            "\"failure\""
        );
    }

    #[test]
    fn notification_carries_all_fields_in_json() {
        let note = Notification::new(
            NotifyStatus::Failure,
            "example.com",
            "Verify error",
            None,
        );
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["domain"], "example.com");
        assert_eq!(json["details"], "Verify error");
        assert!(json["next_run"].is_null());
        assert!(json["timestamp"].is_string());
    }
}
