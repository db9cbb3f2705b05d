// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local driver: runs jobs as detached child processes of the current host.
//!
//! Submission writes a wrapper script that exports the `KONG_*` environment
//! contract, redirects the payload's stdout/stderr to per-job files and
//! records the payload exit code in `exit_status.txt` (a signal trap records
//! signal-induced exits too). Reconciliation inspects the recorded pid:
//! zombies are reaped, live pids mean RUNNING, vanished pids fall back to
//! the exit-status file.

use crate::driver::{
    check_driver, CleanupProgress, Driver, DriverError, JobSpec, OutputHandle, WaitOptions,
    WaitProgress,
};
use crate::executor::{Executor, CLEANUP_WORKERS};
use crate::layout;
use async_trait::async_trait;
use kong_core::{Clock, Config, DriverKind, Folder, Job, JobStatus, SystemClock};
use kong_storage::{NewJob, Store, UPDATE_CHUNK};
use nix::sys::signal::{kill as send_signal, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

/// Cadence of pid probing while waiting on a running child.
const PID_POLL: Duration = Duration::from_millis(100);

fn jobscript(
    command: &str,
    job: &Job,
    stdout: &Path,
    stderr: &Path,
    exit_status_file: &Path,
    output_dir: &Path,
    log_dir: &Path,
    scratch_dir: &Path,
) -> String {
    format!(
        r#"#!/usr/bin/env bash

exit_status_file={exit_status_file}
stdout={stdout}
stderr={stderr}

sig_handler() {{
    exit_status=$?
    echo $exit_status > $exit_status_file
}}
trap sig_handler INT HUP TERM QUIT

export KONG_JOB_ID={job_id}
export KONG_JOB_OUTPUT_DIR={output_dir}
export KONG_JOB_LOG_DIR={log_dir}
export KONG_JOB_NPROC={nproc}
export KONG_JOB_SCRATCHDIR={scratch_dir}

touch $stdout
touch $stderr

({command}) >> $stdout 2>> $stderr
echo $? > {exit_status_file}
"#,
        exit_status_file = exit_status_file.display(),
        stdout = stdout.display(),
        stderr = stderr.display(),
        job_id = job.job_id,
        output_dir = output_dir.display(),
        log_dir = log_dir.display(),
        nproc = job.cores,
        scratch_dir = scratch_dir.display(),
        command = command,
    )
}

/// Observed state of a recorded pid.
enum PidState {
    Running,
    Gone,
}

/// Reap the pid if it is a waitable zombie, otherwise probe whether it is
/// still alive. Pids that are not our children (after a process restart)
/// are probed with signal 0.
fn reap_or_probe(pid: i32) -> PidState {
    let pid = Pid::from_raw(pid);
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::StillAlive) => PidState::Running,
        Ok(status) => {
            tracing::debug!(?status, "reaped child");
            PidState::Gone
        }
        Err(_) => match send_signal(pid, None::<Signal>) {
            Ok(()) => PidState::Running,
            Err(_) => PidState::Gone,
        },
    }
}

pub struct LocalDriver<C: Clock = SystemClock> {
    store: Store,
    config: Config,
    clock: C,
}

impl LocalDriver<SystemClock> {
    pub fn new(config: Config, store: Store) -> Result<Self, DriverError> {
        Self::with_clock(config, store, SystemClock)
    }
}

impl<C: Clock> LocalDriver<C> {
    pub fn with_clock(config: Config, store: Store, clock: C) -> Result<Self, DriverError> {
        if !config.jobdir.is_dir() {
            return Err(DriverError::Backend(format!(
                "jobdir {} does not exist",
                config.jobdir.display()
            )));
        }
        Ok(Self {
            store,
            config,
            clock,
        })
    }

    fn recorded_pid(job: &Job) -> Result<i32, DriverError> {
        job.data
            .i64("pid")
            .map(|pid| pid as i32)
            .ok_or_else(|| DriverError::Backend(format!("{job} has no recorded pid")))
    }

    /// Decide terminal status from `exit_status.txt`.
    fn apply_exit_file(job: &mut Job) {
        let Some(path) = job.data.path("exit_status_file") else {
            job.status = JobStatus::Unknown;
            return;
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => match text.trim().parse::<i64>() {
                Ok(code) => {
                    job.data.set_i64("exit_code", code);
                    job.status = if code == 0 {
                        JobStatus::Completed
                    } else {
                        JobStatus::Failed
                    };
                }
                Err(_) => {
                    tracing::warn!(%job, path = %path.display(), "unparsable exit status file");
                    job.status = JobStatus::Unknown;
                }
            },
            Err(_) => {
                tracing::debug!(%job, "process exited but exit status file is missing");
                job.status = JobStatus::Unknown;
            }
        }
    }

    /// Reconcile in memory, without persisting. Only SUBMITTED/RUNNING jobs
    /// can change without intervention.
    fn sync_in_place(&self, job: &mut Job) -> Result<(), DriverError> {
        check_driver(DriverKind::Local, job)?;
        if !job.status.is_live() {
            return Ok(());
        }
        let pid = Self::recorded_pid(job)?;
        match reap_or_probe(pid) {
            PidState::Running => job.status = JobStatus::Running,
            PidState::Gone => Self::apply_exit_file(job),
        }
        Ok(())
    }

    /// Kill in memory, without persisting.
    fn kill_in_place(&self, job: &mut Job) -> Result<(), DriverError> {
        self.sync_in_place(job)?;
        match job.status {
            JobStatus::Created => {
                tracing::debug!(%job, "not yet submitted, marking failed");
                job.status = JobStatus::Failed;
            }
            JobStatus::Submitted | JobStatus::Running => {
                let pid = Self::recorded_pid(job)?;
                tracing::debug!(%job, pid, "killing pid");
                let pid = Pid::from_raw(pid);
                let _ = send_signal(pid, Signal::SIGKILL);
                let _ = waitpid(pid, None);
                job.status = JobStatus::Failed;
            }
            _ => {
                tracing::debug!(%job, "already terminal, kill is a no-op");
            }
        }
        Ok(())
    }

    /// Remove output artifacts so the job directory can be reused, then
    /// recreate the empty directories.
    fn clear_artifacts(job: &Job) -> Result<(), DriverError> {
        for key in ["exit_status_file", "stdout", "stderr"] {
            if let Some(path) = job.data.path(key) {
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
            }
        }
        for key in ["scratch_dir", "output_dir"] {
            if let Some(path) = job.data.path(key) {
                layout::rmtree(&path)?;
                std::fs::create_dir_all(&path)?;
            }
        }
        Ok(())
    }

    /// Delete the job's directories; failures are logged and swallowed,
    /// returning how many removals failed.
    fn remove_directories(job: &Job) -> usize {
        let mut failures = 0;
        for key in ["log_dir", "output_dir", "scratch_dir"] {
            if let Some(path) = job.data.path(key) {
                if let Err(err) = layout::rmtree(&path) {
                    tracing::warn!(%job, path = %path.display(), %err, "unable to remove directory");
                    failures += 1;
                }
            }
        }
        failures
    }

    fn spawn_job(&self, job: &mut Job) -> Result<(), DriverError> {
        let script = job
            .data
            .path("jobscript")
            .ok_or_else(|| DriverError::Backend(format!("{job} has no jobscript")))?;
        tracing::debug!(%job, script = %script.display(), "spawning jobscript");
        let child = Command::new("/usr/bin/env")
            .arg("bash")
            .arg(&script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        job.data.set_i64("pid", child.id() as i64);
        job.status = JobStatus::Submitted;
        // The child handle is dropped without waiting: the process runs
        // detached and is reaped later by sync_status.
        Ok(())
    }

    fn submit_in_place(&self, job: &mut Job) -> Result<(), DriverError> {
        self.sync_in_place(job)?;
        if job.status != JobStatus::Created {
            return Err(DriverError::InvalidStatus(format!(
                "cannot submit {job} in status {}",
                job.status
            )));
        }
        self.spawn_job(job)
    }

    fn validate_resubmit(jobs: &[Job]) -> Result<(), DriverError> {
        for job in jobs {
            if !job.status.is_terminal() {
                return Err(DriverError::InvalidStatus(format!(
                    "will not resubmit {job} in status {}",
                    job.status
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<C: Clock> Driver for LocalDriver<C> {
    fn kind(&self) -> DriverKind {
        DriverKind::Local
    }

    async fn create_job(&self, folder: &Folder, spec: JobSpec) -> Result<Job, DriverError> {
        if spec.command.is_empty() {
            return Err(DriverError::InvalidSpec("command must not be empty".into()));
        }
        // The local back-end has no scheduler handing out ids, so the
        // batch_job_id is allocated here.
        let batch_job_id = uuid::Uuid::new_v4().to_string();
        let mut job = self.store.insert_job(NewJob {
            batch_job_id: Some(batch_job_id),
            driver: DriverKind::Local,
            folder_id: folder.folder_id,
            command: spec.command.clone(),
            cores: spec.cores,
            memory: spec.memory,
        })?;

        let output_dir = layout::output_dir(&self.config.joboutputdir, job.job_id);
        std::fs::create_dir_all(&output_dir)?;
        let log_dir = layout::log_dir(&self.config.jobdir, job.job_id);
        std::fs::create_dir_all(&log_dir)?;

        let stdout = log_dir.join("stdout.txt");
        let stderr = log_dir.join("stderr.txt");
        let exit_status_file = log_dir.join("exit_status.txt");
        let scriptpath = log_dir.join("jobscript.sh");

        let scratch_dir: PathBuf = tempfile::Builder::new()
            .prefix(&format!("kong_job_{}", job.job_id))
            .tempdir()?
            .keep();

        job.data.set_path("stdout", &stdout);
        job.data.set_path("stderr", &stderr);
        job.data.set_path("exit_status_file", &exit_status_file);
        job.data.set_path("jobscript", &scriptpath);
        job.data.set_path("output_dir", &output_dir);
        job.data.set_path("log_dir", &log_dir);
        job.data.set_path("scratch_dir", &scratch_dir);

        let script = jobscript(
            &spec.command,
            &job,
            &stdout,
            &stderr,
            &exit_status_file,
            &output_dir,
            &log_dir,
            &scratch_dir,
        );
        std::fs::write(&scriptpath, script)?;

        Ok(self.store.update_job(&job)?)
    }

    async fn sync_status(&self, job: &mut Job) -> Result<(), DriverError> {
        self.sync_in_place(job)?;
        *job = self.store.update_job(job)?;
        Ok(())
    }

    async fn bulk_sync_status(&self, mut jobs: Vec<Job>) -> Result<Vec<Job>, DriverError> {
        for job in &mut jobs {
            self.sync_in_place(job)?;
        }
        self.store.update_jobs(&jobs)?;
        let ids: Vec<_> = jobs.iter().map(|job| job.job_id).collect();
        Ok(self.store.jobs_by_ids(&ids)?)
    }

    async fn submit(&self, job: &mut Job) -> Result<(), DriverError> {
        self.submit_in_place(job)?;
        *job = self.store.update_job(job)?;
        tracing::debug!(%job, "submitted");
        Ok(())
    }

    async fn bulk_submit(&self, mut jobs: Vec<Job>) -> Result<Vec<Job>, DriverError> {
        let mut committed: Vec<kong_core::JobId> = Vec::with_capacity(jobs.len());
        for chunk in jobs.chunks_mut(UPDATE_CHUNK) {
            for job in chunk.iter_mut() {
                self.submit_in_place(job)?;
            }
            self.store.update_jobs(chunk)?;
            committed.extend(chunk.iter().map(|job| job.job_id));
        }
        Ok(self.store.jobs_by_ids(&committed)?)
    }

    async fn kill(&self, job: &mut Job) -> Result<(), DriverError> {
        self.kill_in_place(job)?;
        *job = self.store.update_job(job)?;
        Ok(())
    }

    async fn bulk_kill(&self, mut jobs: Vec<Job>) -> Result<Vec<Job>, DriverError> {
        for job in &mut jobs {
            self.kill_in_place(job)?;
        }
        self.store.update_jobs(&jobs)?;
        let ids: Vec<_> = jobs.iter().map(|job| job.job_id).collect();
        Ok(self.store.jobs_by_ids(&ids)?)
    }

    async fn wait(
        &self,
        mut jobs: Vec<Job>,
        opts: WaitOptions,
        progress: Option<WaitProgress>,
    ) -> Result<Vec<Job>, DriverError> {
        for job in &jobs {
            check_driver(DriverKind::Local, job)?;
            if job.status == JobStatus::Created {
                return Err(DriverError::InvalidStatus(format!(
                    "{job} is in status CREATED, cannot wait"
                )));
            }
        }
        let start = self.clock.now();
        for job in &jobs {
            if !job.status.is_live() {
                continue;
            }
            let pid = Self::recorded_pid(job)?;
            loop {
                match reap_or_probe(pid) {
                    PidState::Gone => break,
                    PidState::Running => {
                        if let Some(timeout) = opts.timeout {
                            if self.clock.now().duration_since(start) > timeout {
                                return Err(DriverError::Timeout(timeout));
                            }
                        }
                        tokio::time::sleep(PID_POLL).await;
                    }
                }
            }
        }
        jobs = self.bulk_sync_status(jobs).await?;
        if let Some(tx) = &progress {
            let _ = tx.send(jobs.clone());
        }
        Ok(jobs)
    }

    async fn resubmit(&self, job: &mut Job) -> Result<(), DriverError> {
        self.sync_status(job).await?;
        Self::validate_resubmit(std::slice::from_ref(job))?;
        // Best-effort kill; terminal jobs make it a no-op.
        let _ = self.kill_in_place(job);
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
        let mut jobs = self.bulk_sync_status(jobs).await?;
        Self::validate_resubmit(&jobs)?;

        for job in &mut jobs {
            let _ = self.kill_in_place(job);
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

        let ids: Vec<_> = jobs.iter().map(|job| job.job_id).collect();
        self.store.reset_status(&ids, JobStatus::Created)?;
        let jobs = self.store.jobs_by_ids(&ids)?;
        if do_submit {
            return self.bulk_submit(jobs).await;
        }
        Ok(jobs)
    }

    async fn cleanup(&self, job: &mut Job) -> Result<(), DriverError> {
        check_driver(DriverKind::Local, job)?;
        if job.status.is_live() {
            return Err(DriverError::InvalidStatus(format!(
                "cannot clean up {job} in status {}, kill it first",
                job.status
            )));
        }
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
        for job in &jobs {
            check_driver(DriverKind::Local, job)?;
            if job.status.is_live() {
                return Err(DriverError::InvalidStatus(format!(
                    "cannot clean up {job} in status {}, kill it first",
                    job.status
                )));
            }
        }
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
        self.sync_status(job).await?;
        if !matches!(job.status, JobStatus::Failed | JobStatus::Completed) {
            return Err(DriverError::InvalidStatus(format!(
                "cannot read stdout of {job} in status {}",
                job.status
            )));
        }
        let path = job
            .data
            .path("stdout")
            .ok_or_else(|| DriverError::Backend(format!("{job} has no stdout path")))?;
        Ok(OutputHandle::open(path)?)
    }

    async fn stderr(&self, job: &mut Job) -> Result<OutputHandle, DriverError> {
        self.sync_status(job).await?;
        if !matches!(job.status, JobStatus::Failed | JobStatus::Completed) {
            return Err(DriverError::InvalidStatus(format!(
                "cannot read stderr of {job} in status {}",
                job.status
            )));
        }
        let path = job
            .data
            .path("stderr")
            .ok_or_else(|| DriverError::Backend(format!("{job} has no stderr path")))?;
        Ok(OutputHandle::open(path)?)
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
