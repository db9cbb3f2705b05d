// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers for scheduler command-line tools.

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for submission commands (sbatch, condor_submit).
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout for accounting queries (sacct, condor_q, condor_history).
/// Accounting backends can be slow when asked about thousands of jobs.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(120);

/// Default timeout for cancellation commands (scancel, condor_rm).
pub const CANCEL_TIMEOUT: Duration = Duration::from_secs(60);

/// Run a subprocess command with a timeout.
///
/// Wraps `Command::output()` with `tokio::time::timeout`, converting timeout
/// expiration into a descriptive error message. The child process is killed
/// automatically if the timeout elapses (via the tokio `Child` drop
/// implementation).
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{} failed: {}", description, io_err)),
        Err(_elapsed) => Err(format!(
            "{} timed out after {}s",
            description,
            timeout.as_secs()
        )),
    }
}

/// Run a scheduler command, requiring a zero exit code, and return stdout.
pub async fn run_checked(
    cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<String, String> {
    let output = run_with_timeout(cmd, timeout, description).await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "{} exited with {}: {}",
            description,
            output.status,
            stderr.trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
