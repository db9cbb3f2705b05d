// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared poll loop driving jobs to terminal states.

use crate::driver::{Driver, DriverError, WaitOptions, WaitProgress};
use kong_core::{Clock, Job, JobStatus};

/// Poll `driver.bulk_sync_status` until every job is terminal.
///
/// Round structure: check the timeout against elapsed wall-clock, sync,
/// stop if nothing is live any more, publish the current view, sleep.
/// Jobs still in CREATED can never finish without a submit, so they are
/// rejected before the first round.
pub(crate) async fn poll_wait<C: Clock>(
    driver: &dyn Driver,
    clock: &C,
    mut jobs: Vec<Job>,
    opts: &WaitOptions,
    progress: Option<&WaitProgress>,
) -> Result<Vec<Job>, DriverError> {
    for job in &jobs {
        if job.status == JobStatus::Created {
            return Err(DriverError::InvalidStatus(format!(
                "{job} is in status CREATED, cannot wait"
            )));
        }
    }

    tracing::debug!(count = jobs.len(), "begin waiting for jobs");
    let start = clock.now();

    loop {
        if let Some(timeout) = opts.timeout {
            if clock.now().duration_since(start) > timeout {
                return Err(DriverError::Timeout(timeout));
            }
        }

        jobs = driver.bulk_sync_status(jobs).await?;
        let remaining = jobs.iter().filter(|job| !job.status.is_terminal()).count();
        if remaining == 0 {
            tracing::debug!("waiting completed");
            return Ok(jobs);
        }

        if let Some(tx) = progress {
            let _ = tx.send(jobs.clone());
        }
        tracing::debug!(remaining, "jobs still pending, sleeping");
        tokio::time::sleep(opts.poll_interval).await;
    }
}
