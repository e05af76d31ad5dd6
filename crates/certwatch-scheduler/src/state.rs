use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::OutcomeKind;

/// Durable record of the last cycle, read back on startup and between sleep
/// chunks. Field names are the on-disk JSON contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerState {
    pub last_run: DateTime<Utc>,
    /// Expiry observed (or produced) by the last cycle; `null` when unknown.
    pub expiry_date: Option<DateTime<Utc>>,
    pub need_renew: bool,
    pub next_run_time: DateTime<Utc>,
    /// Absent in files written by older releases.
    #[serde(default)]
    pub last_outcome: Option<OutcomeKind>,
}

/// Loads and atomically replaces the state file.
///
/// A missing file is the normal first-run condition. A file that cannot be
/// read or parsed is reported and then ignored, which degrades to the same
/// "never run" behavior instead of trusting half-written content.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<SchedulerState> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no scheduler state file yet");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "scheduler state not readable");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "scheduler state corrupt, ignoring it");
                None
            }
        }
    }

    /// Write-to-temp-then-rename so a crash mid-write leaves either the old
    /// file or none, never a torn one.
    pub fn save(&self, state: &SchedulerState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(state)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, json)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        debug!(path = %self.path.display(), "scheduler state saved");
        Ok(())
    }
}
