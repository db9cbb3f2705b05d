// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor indirection for parallel filesystem work.
//!
//! Bulk cleanup and resubmission remove many directory trees; the executor
//! decides whether that happens inline or on a bounded pool of blocking
//! threads. Serial is the default so tests and small batches stay
//! deterministic.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Worker count used by the bulk resubmit/cleanup paths.
pub const CLEANUP_WORKERS: usize = 40;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("worker task failed: {0}")]
    Join(String),
}

/// How to run a batch of independent closures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Executor {
    /// Run everything inline, in order.
    #[default]
    Serial,
    /// Run on up to `n` blocking threads at a time.
    Workers(usize),
}

impl Executor {
    /// Run all tasks and return their results in input order.
    pub async fn run<T, F>(&self, tasks: Vec<F>) -> Result<Vec<T>, ExecutorError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        match self {
            Executor::Serial => Ok(tasks.into_iter().map(|task| task()).collect()),
            Executor::Workers(n) => {
                let gate = Arc::new(Semaphore::new((*n).max(1)));
                let mut handles = Vec::with_capacity(tasks.len());
                for task in tasks {
                    let permit = gate
                        .clone()
                        .acquire_owned()
                        .await
                        .map_err(|e| ExecutorError::Join(e.to_string()))?;
                    handles.push(tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        task()
                    }));
                }
                let mut out = Vec::with_capacity(handles.len());
                for handle in handles {
                    out.push(handle.await.map_err(|e| ExecutorError::Join(e.to_string()))?);
                }
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
