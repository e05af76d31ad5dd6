//! The renewal decision-and-scheduling engine.
//!
//! Everything temporal lives here: whether a certificate needs renewal,
//! when to look next, how that decision survives restarts and how the
//! long-running loop follows it.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`decision`] | Pure renewal decision with the dual next-check bound |
//! | [`types`] | [`RenewalOutcome`], one per cycle |
//! | [`state`] | Durable JSON state with atomic replace |
//! | [`cycle`] | Inspect → decide → renew → persist → notify |
//! | [`engine`] | Chunked-sleep loop, cold start, early wake, shutdown |

pub mod cycle;
pub mod decision;
pub mod engine;
pub mod error;
pub mod state;
pub mod types;

pub use cycle::RenewalCycle;
pub use decision::{decide, Decision};
pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use state::{SchedulerState, StateStore};
pub use types::{OutcomeKind, RenewalOutcome};
