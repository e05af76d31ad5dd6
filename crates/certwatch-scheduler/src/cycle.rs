use std::sync::Arc;

use certwatch_acme::{CertIssuer, IssueOutcome, RATE_LIMIT_REMEDIATION};
use certwatch_core::CertwatchConfig;
use certwatch_notify::{Notification, NotificationManager, NotifyStatus};
use certwatch_probe::{CertificateStatus, ExpiryProbe};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::decision::decide;
use crate::state::{SchedulerState, StateStore};
use crate::types::RenewalOutcome;

/// One full pass: inspect, decide, renew if due, persist, notify.
///
/// Collaborators come in as trait objects so the cycle itself stays testable
/// without a network, a CA or a chat backend.
pub struct RenewalCycle {
    config: Arc<CertwatchConfig>,
    domain: String,
    probe: Arc<dyn ExpiryProbe>,
    issuer: Arc<dyn CertIssuer>,
    notifier: Arc<NotificationManager>,
    store: StateStore,
}

impl RenewalCycle {
    pub fn new(
        config: Arc<CertwatchConfig>,
        domain: String,
        probe: Arc<dyn ExpiryProbe>,
        issuer: Arc<dyn CertIssuer>,
        notifier: Arc<NotificationManager>,
        store: StateStore,
    ) -> Self {
        Self {
            config,
            domain,
            probe,
            issuer,
            notifier,
            store,
        }
    }

    /// Runs the cycle to completion. Never fails upward: every path ends in
    /// an outcome, one state write attempt and exactly one notification.
    pub async fn run(&self) -> RenewalOutcome {
        let started = Utc::now();
        let window = self.config.certificate.renewal_window_days;
        let interval = self.config.certificate.check_interval_days;
        info!(domain = %self.domain, "renewal cycle starting");

        match self.store.load() {
            Some(previous) => {
                debug!(last_run = %previous.last_run.to_rfc3339(), "previous scheduler state loaded")
            }
            None => info!("no previous scheduler state, treating this as the first run"),
        }

        let status = self.probe.inspect(&self.domain).await;
        let decision = decide(&status, started, window, interval);

        let outcome = if !decision.needs_renewal {
            info!(
                domain = %self.domain,
                next_check = %decision.next_check.to_rfc3339(),
                "certificate still outside the renewal window, skipping"
            );
            RenewalOutcome::Skipped {
                next_check: decision.next_check,
            }
        } else {
            match status.expires_at {
                Some(expires_at) => info!(
                    domain = %self.domain,
                    expires_at = %expires_at.to_rfc3339(),
                    "expiry inside the renewal window, renewing"
                ),
                None => warn!(
                    domain = %self.domain,
                    "expiry could not be determined, renewing to be safe"
                ),
            }
            self.renew(window, interval).await
        };

        self.persist(started, &status, &outcome);
        self.notify(&outcome).await;

        info!(
            domain = %self.domain,
            outcome = %outcome.kind(),
            next_run = %outcome.next_run().to_rfc3339(),
            "renewal cycle finished"
        );
        outcome
    }

    async fn renew(&self, window: i64, interval: i64) -> RenewalOutcome {
        match self.issuer.issue_and_deploy(&self.domain).await {
            IssueOutcome::Issued {
                new_expiry,
                deploy_warning,
            } => {
                let now = Utc::now();
                let next_check = match new_expiry {
                    Some(expiry) => {
                        let refreshed = CertificateStatus {
                            domain: self.domain.clone(),
                            expires_at: Some(expiry),
                            checked_at: now,
                        };
                        decide(&refreshed, now, window, interval).next_check
                    }
                    None => now + Duration::days(interval),
                };
                RenewalOutcome::Renewed {
                    new_expiry,
                    next_check,
                    deploy_warning,
                }
            }
            IssueOutcome::RateLimited { detail } => RenewalOutcome::FailedTransient {
                reason: format!("{detail}; remediation: {RATE_LIMIT_REMEDIATION}"),
                retry_after: Utc::now()
                    + Duration::seconds(self.config.scheduler.retry_backoff_secs as i64),
            },
            IssueOutcome::Failed { detail } => RenewalOutcome::FailedTerminal {
                reason: detail,
                next_check: Utc::now() + Duration::days(interval),
            },
        }
    }

    /// A failed write is logged and the cycle carries on: the notification
    /// must still go out, and the loop falls back to its normal cadence.
    fn persist(&self, started: DateTime<Utc>, status: &CertificateStatus, outcome: &RenewalOutcome) {
        let expiry_date = match outcome {
            RenewalOutcome::Renewed { new_expiry, .. } => new_expiry.or(status.expires_at),
            _ => status.expires_at,
        };
        let state = SchedulerState {
            last_run: started,
            expiry_date,
            need_renew: outcome.is_failure(),
            next_run_time: outcome.next_run(),
            last_outcome: Some(outcome.kind()),
        };

        if let Err(e) = self.store.save(&state) {
            error!(
                path = %self.store.path().display(),
                error = %e,
                "could not persist scheduler state"
            );
        }
    }

    async fn notify(&self, outcome: &RenewalOutcome) {
        let (status, details) = match outcome {
            RenewalOutcome::Skipped { .. } => (
                NotifyStatus::Success,
                "No renewal needed, the certificate is still outside the renewal window."
                    .to_string(),
            ),
            RenewalOutcome::Renewed {
                new_expiry,
                deploy_warning,
                ..
            } => {
                let mut details = match new_expiry {
                    Some(expiry) => format!(
                        "Wildcard certificate renewed and installed, valid until {}.",
                        expiry.format("%Y-%m-%d")
                    ),
                    None => "Wildcard certificate renewed and installed.".to_string(),
                };
                if let Some(warning) = deploy_warning {
                    details.push_str(&format!(" Warning: NAS deploy failed: {warning}"));
                }
                (NotifyStatus::Success, details)
            }
            RenewalOutcome::FailedTransient { reason, .. }
            | RenewalOutcome::FailedTerminal { reason, .. } => {
                (NotifyStatus::Failure, reason.clone())
            }
        };

        let note = Notification::new(status, &self.domain, details, Some(outcome.next_run()));
        self.notifier.dispatch(&note).await;
    }
}
