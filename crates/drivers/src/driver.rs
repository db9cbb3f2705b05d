// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The driver interface.

use crate::executor::{Executor, ExecutorError};
use async_trait::async_trait;
use kong_core::{ConfigError, DriverKind, Folder, Job, JobId, Walltime, WalltimeError};
use kong_storage::StorageError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from driver operations
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("job {job} belongs to {actual}, not {expected}")]
    Mismatch {
        job: JobId,
        actual: DriverKind,
        expected: DriverKind,
    },
    #[error("invalid job status: {0}")]
    InvalidStatus(String),
    #[error("invalid job spec: {0}")]
    InvalidSpec(String),
    #[error("wait timed out after {0:?}")]
    Timeout(Duration),
    #[error("back-end error: {0}")]
    Backend(String),
    #[error("not supported by this driver: {0}")]
    Unsupported(&'static str),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Walltime(#[from] WalltimeError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Everything a driver needs to create one job. Fields a back-end has no use
/// for are ignored by it.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub command: String,
    pub cores: u32,
    /// Memory in megabytes.
    pub memory: u32,
    /// Display name; defaults to `kong_job_<id>`.
    pub name: Option<String>,
    /// Slurm partition; defaults to the configured queue.
    pub queue: Option<String>,
    /// HTCondor universe; defaults to the configured one.
    pub universe: Option<String>,
    pub walltime: Walltime,
    /// Slurm license request, verbatim.
    pub licenses: Option<String>,
    pub nnodes: u32,
    pub ntasks: u32,
    /// Externally allocated grid task id.
    pub task_id: Option<String>,
}

impl JobSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cores: 1,
            memory: 1000,
            name: None,
            queue: None,
            universe: None,
            walltime: Walltime::default(),
            licenses: None,
            nnodes: 1,
            ntasks: 1,
            task_id: None,
        }
    }

    pub fn cores(mut self, cores: u32) -> Self {
        self.cores = cores;
        self
    }

    pub fn memory(mut self, memory: u32) -> Self {
        self.memory = memory;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn walltime(mut self, walltime: Walltime) -> Self {
        self.walltime = walltime;
        self
    }

    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

/// Options for [`Driver::wait`].
#[derive(Debug, Clone)]
pub struct WaitOptions {
    /// Pause between poll rounds.
    pub poll_interval: Duration,
    /// Wall-clock limit; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            timeout: None,
        }
    }
}

impl WaitOptions {
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Each wait poll round publishes the full reloaded job list here.
pub type WaitProgress = mpsc::UnboundedSender<Vec<Job>>;

/// Each cleaned-up job is published here as its directories go away.
pub type CleanupProgress = mpsc::UnboundedSender<Job>;

/// A readable handle over a job's captured stdout/stderr. The underlying
/// file is closed when the handle is dropped, on every exit path.
#[derive(Debug)]
pub struct OutputHandle {
    path: PathBuf,
    file: std::fs::File,
}

impl OutputHandle {
    pub fn open(path: PathBuf) -> std::io::Result<Self> {
        let file = std::fs::File::open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole stream into a string.
    pub fn read_all(mut self) -> std::io::Result<String> {
        let mut out = String::new();
        self.file.read_to_string(&mut out)?;
        Ok(out)
    }
}

impl Read for OutputHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.file.read(buf)
    }
}

/// The capability surface every back-end implements.
///
/// Single-job operations mutate the given row in place and persist it; bulk
/// operations take a homogeneous set, perform one back-end interaction where
/// the back-end allows it, commit all row writes in a single transaction and
/// return the reloaded rows. Every per-job operation checks that the job is
/// routed to this driver and fails with [`DriverError::Mismatch`] otherwise.
#[async_trait]
pub trait Driver: Send + Sync {
    fn kind(&self) -> DriverKind;

    /// Create a persisted job in status CREATED with its directories and
    /// submission scripts on disk.
    async fn create_job(&self, folder: &Folder, spec: JobSpec) -> Result<Job, DriverError>;

    /// Create many jobs; the result preserves spec order.
    async fn bulk_create_jobs(
        &self,
        folder: &Folder,
        specs: Vec<JobSpec>,
    ) -> Result<Vec<Job>, DriverError> {
        let mut jobs = Vec::with_capacity(specs.len());
        for spec in specs {
            jobs.push(self.create_job(folder, spec).await?);
        }
        Ok(jobs)
    }

    /// Reconcile one job against the authoritative back-end state.
    async fn sync_status(&self, job: &mut Job) -> Result<(), DriverError>;

    /// Reconcile a set: one back-end query, one transaction, reloaded rows.
    /// Jobs the scheduler does not know about are left untouched.
    async fn bulk_sync_status(&self, jobs: Vec<Job>) -> Result<Vec<Job>, DriverError>;

    /// CREATED → SUBMITTED, assigning `batch_job_id` if the back-end hands
    /// one out at submission.
    async fn submit(&self, job: &mut Job) -> Result<(), DriverError>;

    /// Submit a set. The first error aborts; rows committed before it stay
    /// SUBMITTED and are safe to retry around.
    async fn bulk_submit(&self, jobs: Vec<Job>) -> Result<Vec<Job>, DriverError>;

    /// CREATED → FAILED locally; SUBMITTED/RUNNING → back-end cancel then
    /// FAILED; terminal statuses are a no-op.
    async fn kill(&self, job: &mut Job) -> Result<(), DriverError>;

    async fn bulk_kill(&self, jobs: Vec<Job>) -> Result<Vec<Job>, DriverError>;

    /// Drive the set to terminal states. Any CREATED job is rejected up
    /// front. Each poll round sends the full job list to `progress`.
    async fn wait(
        &self,
        jobs: Vec<Job>,
        opts: WaitOptions,
        progress: Option<WaitProgress>,
    ) -> Result<Vec<Job>, DriverError>;

    /// Clear artifacts of a terminal job, reset it to CREATED and submit it
    /// again.
    async fn resubmit(&self, job: &mut Job) -> Result<(), DriverError>;

    /// Bulk resubmission; the eligibility check covers the whole set before
    /// any side effect.
    async fn bulk_resubmit(&self, jobs: Vec<Job>, do_submit: bool)
        -> Result<Vec<Job>, DriverError>;

    /// Delete the job's external directories. Rejected while the job may
    /// still be running; idempotent otherwise.
    async fn cleanup(&self, job: &mut Job) -> Result<(), DriverError>;

    /// Parallel cleanup via the supplied executor. Individual directory
    /// removal failures are logged, counted and swallowed.
    async fn bulk_cleanup(
        &self,
        jobs: Vec<Job>,
        executor: Executor,
        progress: Option<CleanupProgress>,
    ) -> Result<Vec<Job>, DriverError>;

    /// Cleanup plus row deletion.
    async fn remove(&self, job: Job) -> Result<(), DriverError>;

    async fn bulk_remove(&self, jobs: Vec<Job>, do_cleanup: bool) -> Result<(), DriverError>;

    /// Scoped read handle over captured stdout.
    async fn stdout(&self, job: &mut Job) -> Result<OutputHandle, DriverError>;

    /// Scoped read handle over captured stderr. Back-ends that merge the
    /// streams return [`DriverError::Unsupported`].
    async fn stderr(&self, job: &mut Job) -> Result<OutputHandle, DriverError>;
}

/// The single guard that prevents mixing drivers.
pub(crate) fn check_driver(expected: DriverKind, job: &Job) -> Result<(), DriverError> {
    if job.driver != expected {
        return Err(DriverError::Mismatch {
            job: job.job_id,
            actual: job.driver,
            expected,
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
