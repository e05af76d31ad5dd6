use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::{AcmeError, Result};

/// Captured result of one acme.sh invocation.
#[derive(Debug)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Both streams joined, for marker scanning.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    /// Short human-readable failure text: stderr when present, stdout otherwise.
    pub fn error_excerpt(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        text.trim().to_string()
    }
}

/// Runs `program` with `args` and extra environment variables, killing it if
/// it outlives `limit`. Credentials travel through the environment and are
/// never logged.
pub async fn run(
    program: &str,
    args: &[String],
    envs: &[(String, String)],
    limit: Duration,
) -> Result<CommandOutput> {
    info!(command = %format!("{} {}", program, args.join(" ")), "running acme.sh");

    let child = Command::new(program)
        .args(args)
        .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| AcmeError::Spawn {
            program: program.to_string(),
            source,
        })?;

    // Dropping the wait future on timeout kills the child via kill_on_drop.
    let output = timeout(limit, child.wait_with_output())
        .await
        .map_err(|_| {
            warn!(%program, secs = limit.as_secs(), "acme.sh run timed out, killing it");
            AcmeError::Timeout {
                secs: limit.as_secs(),
            }
        })?
        .map_err(AcmeError::Io)?;

    Ok(CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
