//! Certificate issuance through the external `acme.sh` client.
//!
//! The issuer shells out to `acme.sh` for the DNS-01 challenge, certificate
//! install and the optional deploy hook. Failures are classified so the
//! scheduler can tell a CA rate limit (retry soon) from everything else
//! (retry at the normal interval).
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`runner`] | Subprocess execution with a hard timeout |
//! | [`classify`] | Rate-limit detection in acme.sh output |
//! | [`issuer`] | The issue / install / deploy pipeline |

pub mod classify;
pub mod error;
pub mod issuer;
pub mod runner;

pub use classify::{failure_kind, FailureKind, RATE_LIMIT_REMEDIATION};
pub use error::{AcmeError, Result};
pub use issuer::{AcmeShIssuer, CertIssuer, IssueOutcome};
pub use runner::CommandOutput;
