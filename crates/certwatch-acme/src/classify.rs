//! Rate-limit detection.
//!
//! Let's Encrypt rejects over-quota orders with a `rateLimited` ACME error.
//! The marker list is configurable because the exact wording has changed
//! between CA releases and differs across CAs.

/// Operator guidance attached to every rate-limited failure. Hitting the
/// limit repeatedly usually means the client state was wiped, forcing a fresh
/// order on every start instead of reusing the previous certificate.
pub const RATE_LIMIT_REMEDIATION: &str =
    "persist the acme.sh state directory (/root/.acme.sh) across restarts so \
     issued certificates and the account are reused instead of reordered";

/// Failure class of an unsuccessful acme.sh run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The CA refused because of a rate limit; worth retrying soon.
    RateLimited,
    /// Anything else: DNS trouble, bad credentials, network errors.
    Other,
}

/// Scans `output` for any of the configured rate-limit markers,
/// case-insensitively.
pub fn failure_kind(output: &str, markers: &[String]) -> FailureKind {
    let haystack = output.to_lowercase();
    let hit = markers
        .iter()
        .map(|m| m.trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .any(|m| haystack.contains(&m));

    if hit {
        FailureKind::RateLimited
    } else {
        FailureKind::Other
    }
}
