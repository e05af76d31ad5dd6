//! The renewal decision. Pure and deterministic; `now` is a parameter so
//! tests can pin the clock.

use certwatch_probe::CertificateStatus;
use chrono::{DateTime, Duration, Utc};

/// What to do about the certificate, and when to look again if nothing is
/// done now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub needs_renewal: bool,
    pub next_check: DateTime<Utc>,
}

/// Decides whether renewal is due.
///
/// An unknown expiry always means "renew": the inspection already failed,
/// and a needless renewal is cheaper than a lapsed certificate.
///
/// When renewal is not due, the next check is the earlier of the normal
/// cadence and one day before the renewal window opens. The first bound
/// stops a distant expiry from pausing checks for months beyond the
/// configured cadence; the second stops a long cadence from overshooting
/// the window.
pub fn decide(
    status: &CertificateStatus,
    now: DateTime<Utc>,
    renewal_window_days: i64,
    interval_days: i64,
) -> Decision {
    let interval_bound = now + Duration::days(interval_days);

    let Some(expires_at) = status.expires_at else {
        return Decision {
            needs_renewal: true,
            next_check: interval_bound,
        };
    };

    let time_left = expires_at - now;
    if time_left < Duration::days(renewal_window_days) {
        return Decision {
            needs_renewal: true,
            next_check: interval_bound,
        };
    }

    let window_bound = expires_at - Duration::days(renewal_window_days - 1);
    Decision {
        needs_renewal: false,
        next_check: interval_bound.min(window_bound),
    }
}
