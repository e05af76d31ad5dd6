use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal result of one renewal cycle. Exactly one is produced per cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum RenewalOutcome {
    /// The certificate is still outside the renewal window.
    Skipped { next_check: DateTime<Utc> },
    /// A new certificate was issued and installed. `new_expiry` is absent
    /// when the installed file could not be read back; `deploy_warning`
    /// reports a failed NAS deploy that did not spoil the renewal.
    Renewed {
        new_expiry: Option<DateTime<Utc>>,
        next_check: DateTime<Utc>,
        deploy_warning: Option<String>,
    },
    /// Rate-limited by the CA; retried after a short backoff.
    FailedTransient {
        reason: String,
        retry_after: DateTime<Utc>,
    },
    /// Anything else; retried at the normal cadence.
    FailedTerminal {
        reason: String,
        next_check: DateTime<Utc>,
    },
}

impl RenewalOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            RenewalOutcome::Skipped { .. } => OutcomeKind::Skipped,
            RenewalOutcome::Renewed { .. } => OutcomeKind::Renewed,
            RenewalOutcome::FailedTransient { .. } => OutcomeKind::FailedTransient,
            RenewalOutcome::FailedTerminal { .. } => OutcomeKind::FailedTerminal,
        }
    }

    /// When the scheduler should look again, whatever the outcome was.
    pub fn next_run(&self) -> DateTime<Utc> {
        match self {
            RenewalOutcome::Skipped { next_check }
            | RenewalOutcome::Renewed { next_check, .. }
            | RenewalOutcome::FailedTerminal { next_check, .. } => *next_check,
            RenewalOutcome::FailedTransient { retry_after, .. } => *retry_after,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RenewalOutcome::FailedTransient { .. } | RenewalOutcome::FailedTerminal { .. }
        )
    }
}

/// Collapsed outcome tag kept in the state file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Skipped,
    Renewed,
    FailedTransient,
    FailedTerminal,
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeKind::Skipped => write!(f, "skipped"),
            OutcomeKind::Renewed => write!(f, "renewed"),
            OutcomeKind::FailedTransient => write!(f, "failed_transient"),
            OutcomeKind::FailedTerminal => write!(f, "failed_terminal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_run_uses_retry_time_for_transient_failures() {
        let retry = Utc.with_ymd_and_hms(2026, 8, 25, 13, 0, 0).unwrap();
        let outcome = RenewalOutcome::FailedTransient {
            reason: "rate limited".to_string(),
            retry_after: retry,
        };
        assert_eq!(outcome.next_run(), retry);
        assert!(outcome.is_failure());
        assert_eq!(outcome.kind(), OutcomeKind::FailedTransient);
    }

    #[test]
    fn successful_outcomes_are_not_failures() {
        let next = Utc.with_ymd_and_hms(2026, 9, 24, 0, 0, 0).unwrap();
        assert!(!RenewalOutcome::Skipped { next_check: next }.is_failure());
        assert!(!RenewalOutcome::Renewed {
            new_expiry: None,
            next_check: next,
            deploy_warning: None,
        }
        .is_failure());
    }

    #[test]
    fn outcome_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&OutcomeKind::FailedTransient).unwrap(),
            "\"failed_transient\""
        );
        assert_eq!(
            serde_json::from_str::<OutcomeKind>("\"renewed\"").unwrap(),
            OutcomeKind::Renewed
        );
    }
}
