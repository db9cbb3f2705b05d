// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared scheduler logic for batch back-ends.
//!
//! A scheduler that offers three primitives — submit one, query many, cancel
//! one — plugs in as a [`BatchBackend`] and [`BatchDriver`] composes the
//! full driver surface on top: the sync/reload cycle, transactional bulk
//! writes, the poll-loop wait, resubmission and cleanup.

use crate::driver::{
    check_driver, CleanupProgress, Driver, DriverError, JobSpec, OutputHandle, WaitOptions,
    WaitProgress,
};
use crate::executor::{Executor, CLEANUP_WORKERS};
use crate::layout;
use crate::wait::poll_wait;
use async_trait::async_trait;
use kong_core::{Clock, DriverKind, Folder, Job, JobStatus, SystemClock};
use kong_storage::{Store, UPDATE_CHUNK};

/// One row of a scheduler accounting response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountingItem {
    pub batch_job_id: String,
    pub status: JobStatus,
    pub exit_code: i64,
}

impl AccountingItem {
    pub fn new(batch_job_id: impl Into<String>, status: JobStatus, exit_code: i64) -> Self {
        Self {
            batch_job_id: batch_job_id.into(),
            status,
            exit_code,
        }
    }
}

/// The three back-end primitives plus per-scheduler job staging.
#[async_trait]
pub trait BatchBackend: Send + Sync {
    fn kind(&self) -> DriverKind;

    /// Create the row and put directories plus submission scripts on disk.
    async fn stage(&self, store: &Store, folder: &Folder, spec: JobSpec)
        -> Result<Job, DriverError>;

    /// Hand one job to the scheduler, returning the allocated batch job id.
    async fn submit_one(&self, job: &Job) -> Result<String, DriverError>;

    /// One accounting query covering the whole set.
    async fn query_many(&self, jobs: &[Job]) -> Result<Vec<AccountingItem>, DriverError>;

    /// Cancel one job at the scheduler.
    async fn cancel_one(&self, job: &Job) -> Result<(), DriverError>;
}

/// A full [`Driver`] over any [`BatchBackend`].
pub struct BatchDriver<B: BatchBackend, C: Clock = SystemClock> {
    store: Store,
    backend: B,
    clock: C,
}

impl<B: BatchBackend> BatchDriver<B, SystemClock> {
    pub fn new(store: Store, backend: B) -> Self {
        Self::with_clock(store, backend, SystemClock)
    }
}

impl<B: BatchBackend, C: Clock> BatchDriver<B, C> {
    pub fn with_clock(store: Store, backend: B, clock: C) -> Self {
        Self {
            store,
            backend,
            clock,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn check_all(&self, jobs: &[Job]) -> Result<(), DriverError> {
        for job in jobs {
            check_driver(self.backend.kind(), job)?;
        }
        Ok(())
    }

    /// Apply one accounting response: match rows by batch id, update status
    /// and exit code, commit in one transaction. Ids the store does not know
    /// are counted and logged, never inserted.
    async fn apply_accounting(&self, jobs: &[Job]) -> Result<(), DriverError> {
        if jobs.iter().all(|job| job.batch_job_id.is_none()) {
            tracing::debug!("no jobs known to the scheduler yet, skipping query");
            return Ok(());
        }
        let items = self.backend.query_many(jobs).await?;

        let mut updated = Vec::new();
        let mut not_found = 0usize;
        for item in items {
            let Some(mut job) = self
                .store
                .job_by_batch_id(&item.batch_job_id, self.backend.kind())?
            else {
                not_found += 1;
                continue;
            };
            job.status = item.status;
            job.data.set_i64("exit_code", item.exit_code);
            updated.push(job);
        }
        if not_found > 0 {
            tracing::warn!(
                not_found,
                "scheduler reported jobs that are not in the database"
            );
        }
        self.store.update_jobs(&updated)?;
        Ok(())
    }

    fn reload(&self, jobs: &[Job]) -> Result<Vec<Job>, DriverError> {
        let ids: Vec<_> = jobs.iter().map(|job| job.job_id).collect();
        Ok(self.store.jobs_by_ids(&ids)?)
    }

    /// Kill in memory: no scheduler interaction unless the job is live.
    async fn kill_in_place(&self, job: &mut Job) -> Result<(), DriverError> {
        check_driver(self.backend.kind(), job)?;
        match job.status {
            JobStatus::Created | JobStatus::Unknown => {
                tracing::debug!(%job, "not known to the scheduler, marking failed");
                job.status = JobStatus::Failed;
            }
            JobStatus::Submitted | JobStatus::Running => {
                self.backend.cancel_one(job).await?;
                job.status = JobStatus::Failed;
            }
            _ => {
                tracing::debug!(%job, "already terminal, kill is a no-op");
            }
        }
        Ok(())
    }

    fn require_not_live(jobs: &[Job]) -> Result<(), DriverError> {
        for job in jobs {
            if job.status.is_live() {
                return Err(DriverError::InvalidStatus(format!(
                    "{job} might be running, kill it first"
                )));
            }
        }
        Ok(())
    }

    /// Clear reusable artifacts before a resubmission: the captured stdout
    /// goes away, the output directory is recreated empty.
    fn clear_artifacts(job: &Job) -> Result<(), DriverError> {
        if let Some(path) = job.data.path("stdout") {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        if let Some(path) = job.data.path("output_dir") {
            layout::rmtree(&path)?;
            std::fs::create_dir_all(&path)?;
        }
        Ok(())
    }

    fn remove_directories(job: &Job) -> usize {
        let mut failures = 0;
        for key in ["log_dir", "output_dir"] {
            if let Some(path) = job.data.path(key) {
                if let Err(err) = layout::rmtree(&path) {
                    tracing::warn!(%job, path = %path.display(), %err, "unable to remove directory");
                    failures += 1;
                }
            }
        }
        failures
    }
}

#[async_trait]
impl<B: BatchBackend, C: Clock> Driver for BatchDriver<B, C> {
    fn kind(&self) -> DriverKind {
        self.backend.kind()
    }

    async fn create_job(&self, folder: &Folder, spec: JobSpec) -> Result<Job, DriverError> {
        if spec.command.is_empty() {
            return Err(DriverError::InvalidSpec("command must not be empty".into()));
        }
        self.backend.stage(&self.store, folder, spec).await
    }

    async fn sync_status(&self, job: &mut Job) -> Result<(), DriverError> {
        check_driver(self.backend.kind(), job)?;
        let synced = self.bulk_sync_status(vec![job.clone()]).await?;
        *job = synced
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::Backend("job vanished during sync".into()))?;
        Ok(())
    }

    async fn bulk_sync_status(&self, jobs: Vec<Job>) -> Result<Vec<Job>, DriverError> {
        tracing::debug!(count = jobs.len(), "bulk status sync");
        self.check_all(&jobs)?;
        self.apply_accounting(&jobs).await?;
        self.reload(&jobs)
    }

    async fn submit(&self, job: &mut Job) -> Result<(), DriverError> {
        check_driver(self.backend.kind(), job)?;
        if job.status != JobStatus::Created {
            return Err(DriverError::InvalidStatus(format!(
                "cannot submit {job} in status {}",
                job.status
            )));
        }
        let batch_job_id = self.backend.submit_one(job).await?;
        job.batch_job_id = Some(batch_job_id);
        job.status = JobStatus::Submitted;
        *job = self.store.update_job(job)?;
        Ok(())
    }

    async fn bulk_submit(&self, mut jobs: Vec<Job>) -> Result<Vec<Job>, DriverError> {
        self.check_all(&jobs)?;
        let mut committed: Vec<kong_core::JobId> = Vec::with_capacity(jobs.len());
        for chunk in jobs.chunks_mut(UPDATE_CHUNK) {
            for job in chunk.iter_mut() {
                if job.status != JobStatus::Created {
                    return Err(DriverError::InvalidStatus(format!(
                        "cannot submit {job} in status {}",
                        job.status
                    )));
                }
                let batch_job_id = self.backend.submit_one(job).await?;
                job.batch_job_id = Some(batch_job_id);
                job.status = JobStatus::Submitted;
            }
            self.store.update_jobs(chunk)?;
            committed.extend(chunk.iter().map(|job| job.job_id));
        }
        Ok(self.store.jobs_by_ids(&committed)?)
    }

    async fn kill(&self, job: &mut Job) -> Result<(), DriverError> {
        self.kill_in_place(job).await?;
        *job = self.store.update_job(job)?;
        Ok(())
    }

    async fn bulk_kill(&self, jobs: Vec<Job>) -> Result<Vec<Job>, DriverError> {
        let mut jobs = self.bulk_sync_status(jobs).await?;
        for job in &mut jobs {
            self.kill_in_place(job).await?;
        }
        self.store.update_jobs(&jobs)?;
        self.reload(&jobs)
    }

    async fn wait(
        &self,
        jobs: Vec<Job>,
        opts: WaitOptions,
        progress: Option<WaitProgress>,
    ) -> Result<Vec<Job>, DriverError> {
        self.check_all(&jobs)?;
        poll_wait(self, &self.clock, jobs, &opts, progress.as_ref()).await
    }

    async fn resubmit(&self, job: &mut Job) -> Result<(), DriverError> {
        tracing::debug!(%job, "resubmit");
        self.sync_status(job).await?;
        if !job.status.is_terminal() {
            return Err(DriverError::InvalidStatus(format!(
                "{job} is not in a terminal status, cannot resubmit"
            )));
        }
        if let Err(err) = self.kill_in_place(job).await {
            tracing::debug!(%job, %err, "best-effort kill failed");
        }
        Self::clear_artifacts(job)?;
        job.status = JobStatus::Created;
        *job = self.store.update_job(job)?;
        self.submit(job).await
    }

    async fn bulk_resubmit(
        &self,
        jobs: Vec<Job>,
        do_submit: bool,
    ) -> Result<Vec<Job>, DriverError> {
        tracing::debug!(count = jobs.len(), "bulk resubmit");
        let mut jobs = self.bulk_sync_status(jobs).await?;
        for job in &jobs {
            if !job.status.is_terminal() {
                return Err(DriverError::InvalidStatus(format!(
                    "{job} is not in a terminal status, cannot resubmit"
                )));
            }
        }

        for job in &mut jobs {
            if let Err(err) = self.kill_in_place(job).await {
                tracing::debug!(%job, %err, "best-effort kill failed");
            }
        }

        let tasks: Vec<_> = jobs
            .iter()
            .cloned()
            .map(|job| {
                move || {
                    if let Err(err) = Self::clear_artifacts(&job) {
                        tracing::warn!(%job, %err, "failed to clear artifacts");
                    }
                }
            })
            .collect();
        Executor::Workers(CLEANUP_WORKERS).run(tasks).await?;

        // Reset is scoped to exactly the resubmitted rows.
        let ids: Vec<_> = jobs.iter().map(|job| job.job_id).collect();
        self.store.reset_status(&ids, JobStatus::Created)?;
        let jobs = self.store.jobs_by_ids(&ids)?;
        if do_submit {
            return self.bulk_submit(jobs).await;
        }
        Ok(jobs)
    }

    async fn cleanup(&self, job: &mut Job) -> Result<(), DriverError> {
        self.sync_status(job).await?;
        Self::require_not_live(std::slice::from_ref(job))?;
        tracing::debug!(%job, "cleanup");
        let failures = Self::remove_directories(job);
        if failures > 0 {
            tracing::warn!(%job, failures, "cleanup left directories behind");
        }
        Ok(())
    }

    async fn bulk_cleanup(
        &self,
        jobs: Vec<Job>,
        executor: Executor,
        progress: Option<CleanupProgress>,
    ) -> Result<Vec<Job>, DriverError> {
        let jobs = self.bulk_sync_status(jobs).await?;
        Self::require_not_live(&jobs)?;
        tracing::debug!(count = jobs.len(), "bulk cleanup");
        let tasks: Vec<_> = jobs
            .iter()
            .cloned()
            .map(|job| {
                let progress = progress.clone();
                move || {
                    Self::remove_directories(&job);
                    if let Some(tx) = progress {
                        let _ = tx.send(job);
                    }
                }
            })
            .collect();
        executor.run(tasks).await?;
        Ok(jobs)
    }

    async fn remove(&self, mut job: Job) -> Result<(), DriverError> {
        tracing::debug!(%job, "removing job");
        self.cleanup(&mut job).await?;
        self.store.delete_jobs(&[job.job_id])?;
        Ok(())
    }

    async fn bulk_remove(&self, jobs: Vec<Job>, do_cleanup: bool) -> Result<(), DriverError> {
        tracing::debug!(count = jobs.len(), "removing jobs");
        let jobs = if do_cleanup {
            self.bulk_cleanup(jobs, Executor::Serial, None).await?
        } else {
            jobs
        };
        let ids: Vec<_> = jobs.iter().map(|job| job.job_id).collect();
        self.store.delete_jobs(&ids)?;
        Ok(())
    }

    async fn stdout(&self, job: &mut Job) -> Result<OutputHandle, DriverError> {
        check_driver(self.backend.kind(), job)?;
        let path = job
            .data
            .path("stdout")
            .ok_or_else(|| DriverError::Backend(format!("{job} has no stdout path")))?;
        Ok(OutputHandle::open(path)?)
    }

    async fn stderr(&self, _job: &mut Job) -> Result<OutputHandle, DriverError> {
        Err(DriverError::Unsupported(
            "stderr is merged into stdout by the batch schedulers",
        ))
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
