use std::sync::Arc;
use std::time::Duration;

use certwatch_core::CertwatchConfig;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cycle::RenewalCycle;
use crate::state::StateStore;

/// Pause after an overdue run so a state file that never advances cannot
/// spin the loop.
const OVERDUE_WAIT: Duration = Duration::from_secs(60);

enum Wake {
    Due,
    AlreadyPast,
    Shutdown,
}

/// The long-running loop: one renewal cycle at a time, chunked sleeps in
/// between, responsive to state rewrites and to shutdown.
pub struct SchedulerEngine {
    config: Arc<CertwatchConfig>,
    cycle: RenewalCycle,
    store: StateStore,
    poll_interval: Duration,
}

impl SchedulerEngine {
    pub fn new(config: Arc<CertwatchConfig>, cycle: RenewalCycle, store: StateStore) -> Self {
        Self {
            config,
            cycle,
            store,
            poll_interval: Duration::from_secs(60),
        }
    }

    /// Shorten the sleep chunk below the 60s default (tests).
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Main loop. Runs one cycle immediately, then follows the schedule
    /// until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("renewal scheduler started");

        info!("running the initial certificate check");
        self.cycle.run().await;

        loop {
            if *shutdown.borrow() {
                info!("renewal scheduler shutting down");
                break;
            }

            let target = self.next_run_time();
            match self.pause_until(target, &mut shutdown).await {
                Wake::Due => {
                    self.cycle.run().await;
                }
                Wake::AlreadyPast => {
                    warn!(
                        scheduled = %target.to_rfc3339(),
                        "scheduled run time already passed, running now"
                    );
                    self.cycle.run().await;
                    if wait_or_shutdown(OVERDUE_WAIT, &mut shutdown).await {
                        break;
                    }
                }
                Wake::Shutdown => break,
            }
        }

        info!("renewal scheduler stopped");
    }

    /// The earlier of the normal cadence and whatever the state file says.
    /// Covers both a fresh install (no file) and a cycle or an operator
    /// having moved the next run.
    fn next_run_time(&self) -> DateTime<Utc> {
        let cadence =
            Utc::now() + chrono::Duration::days(self.config.certificate.check_interval_days);
        match self.store.load() {
            Some(state) => cadence.min(state.next_run_time),
            None => cadence,
        }
    }

    /// Chunked sleep toward `target`, re-reading the state file between
    /// chunks and re-targeting when the next run moved earlier.
    async fn pause_until(
        &self,
        mut target: DateTime<Utc>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Wake {
        let now = Utc::now();
        if target <= now {
            return Wake::AlreadyPast;
        }
        info!(
            next_run = %target.to_rfc3339(),
            hours_away = %format!("{:.1}", (target - now).num_seconds() as f64 / 3600.0),
            "sleeping until the next certificate check"
        );

        loop {
            let now = Utc::now();
            if target <= now {
                return Wake::Due;
            }
            let remaining = (target - now).to_std().unwrap_or(Duration::ZERO);
            let chunk = remaining.min(self.poll_interval);

            tokio::select! {
                _ = tokio::time::sleep(chunk) => {}
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        info!("renewal scheduler shutting down");
                        return Wake::Shutdown;
                    }
                }
            }

            let fresh = self.next_run_time();
            if fresh < target {
                info!(
                    next_run = %fresh.to_rfc3339(),
                    "next run time moved earlier, updating the plan"
                );
                target = fresh;
            }
        }
    }
}

/// `true` means shutdown was requested during the wait.
async fn wait_or_shutdown(wait: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(wait) => false,
        res = shutdown.changed() => res.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SchedulerState;
    use async_trait::async_trait;
    use certwatch_acme::{CertIssuer, IssueOutcome};
    use certwatch_notify::{Notification, NotificationManager, Notifier};
    use certwatch_probe::{CertificateStatus, ExpiryProbe};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct HealthyProbe;

    #[async_trait]
    impl ExpiryProbe for HealthyProbe {
        async fn inspect(&self, domain: &str) -> CertificateStatus {
            CertificateStatus {
                domain: domain.to_string(),
                expires_at: Some(Utc::now() + chrono::Duration::days(90)),
                checked_at: Utc::now(),
            }
        }
    }

    struct UnusedIssuer;

    #[async_trait]
    impl CertIssuer for UnusedIssuer {
        async fn issue_and_deploy(&self, _domain: &str) -> IssueOutcome {
            panic!("issuer must not run for a healthy certificate");
        }
    }

    struct RecordingNotifier {
        notes: Arc<Mutex<Vec<Notification>>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, note: &Notification) -> certwatch_notify::Result<()> {
            self.notes.lock().unwrap().push(note.clone());
            Ok(())
        }
    }

    struct Harness {
        engine: SchedulerEngine,
        notes: Arc<Mutex<Vec<Notification>>>,
        store: StateStore,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let config = Arc::new(CertwatchConfig::default());

        let notes = Arc::new(Mutex::new(Vec::new()));
        let mut manager = NotificationManager::new();
        manager.register(Box::new(RecordingNotifier {
            notes: notes.clone(),
        }));

        let cycle = RenewalCycle::new(
            config.clone(),
            "example.com".to_string(),
            Arc::new(HealthyProbe),
            Arc::new(UnusedIssuer),
            Arc::new(manager),
            store.clone(),
        );
        let engine = SchedulerEngine::new(config, cycle, store.clone())
            .with_poll_interval(Duration::from_millis(50));

        Harness {
            engine,
            notes,
            store,
            _dir: dir,
        }
    }

    async fn wait_for_notes(notes: &Arc<Mutex<Vec<Notification>>>, want: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if notes.lock().unwrap().len() >= want {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {want} notifications"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn cold_start_runs_a_cycle_immediately() {
        let h = harness();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(h.engine.run(shutdown_rx));

        wait_for_notes(&h.notes, 1).await;
        assert!(h.store.load().is_some());

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn externally_shortened_schedule_wakes_the_loop_early() {
        let h = harness();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(h.engine.run(shutdown_rx));

        // The cold-start cycle schedules the next run ~30 days out.
        wait_for_notes(&h.notes, 1).await;

        // Move the next run to a few hundred milliseconds from now, as an
        // operator editing the file would.
        let state = SchedulerState {
            last_run: Utc::now(),
            expiry_date: None,
            need_renew: false,
            next_run_time: Utc::now() + chrono::Duration::milliseconds(300),
            last_outcome: None,
        };
        h.store.save(&state).unwrap();

        wait_for_notes(&h.notes, 2).await;

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_interrupts_the_sleep() {
        let h = harness();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(h.engine.run(shutdown_rx));

        wait_for_notes(&h.notes, 1).await;
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("engine must stop promptly on shutdown")
            .unwrap();
        // Only the cold-start cycle ever ran.
        assert_eq!(h.notes.lock().unwrap().len(), 1);
    }
}
