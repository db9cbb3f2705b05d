// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Slurm driver: sbatch/sacct/scancel behind an injectable client.

use crate::batch::{AccountingItem, BatchBackend, BatchDriver};
use crate::driver::{DriverError, JobSpec};
use crate::layout;
use crate::subprocess::{run_checked, CANCEL_TIMEOUT, QUERY_TIMEOUT, SUBMIT_TIMEOUT};
use async_trait::async_trait;
use chrono::{Days, Utc};
use kong_core::{Config, DriverKind, Folder, Job, JobStatus, SlurmConfig};
use kong_storage::{NewJob, Store};
use std::sync::Arc;
use tokio::process::Command;

/// One parsed `sacct` line, still in scheduler vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlurmAccounting {
    pub batch_job_id: String,
    pub state: String,
    pub exit_code: i64,
}

/// Map a Slurm state string plus exit code onto the internal status.
///
/// `sacct` reports cancellations as `CANCELLED by <uid>`, hence the prefix
/// match. A `COMPLETED` state with a non-zero exit code is a failure no
/// matter what the scheduler thinks.
pub(crate) fn map_state(state: &str, exit_code: i64) -> JobStatus {
    if state == "PENDING" {
        JobStatus::Submitted
    } else if state == "COMPLETED" {
        if exit_code == 0 {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        }
    } else if state == "FAILED" || state.starts_with("CANCELLED") {
        JobStatus::Failed
    } else if state == "RUNNING" {
        JobStatus::Running
    } else {
        JobStatus::Unknown
    }
}

/// The three Slurm primitives.
#[async_trait]
pub trait SlurmClient: Send + Sync {
    /// Submit the job's batch file, returning the allocated job id.
    async fn sbatch(&self, job: &Job) -> Result<String, DriverError>;

    /// Query accounting for the given jobs (one call for the whole set).
    async fn sacct(&self, jobs: &[Job]) -> Result<Vec<SlurmAccounting>, DriverError>;

    async fn scancel(&self, job: &Job) -> Result<(), DriverError>;
}

/// Client that shells out to the real Slurm tools.
#[derive(Debug, Default)]
pub struct ShellSlurmClient;

impl ShellSlurmClient {
    /// Parse `sacct --parsable2` output: `JobID|State|ExitCode` lines, the
    /// exit code as `code:signal`. Non-numeric job ids (job steps like
    /// `123.batch`) are skipped.
    pub(crate) fn parse_sacct(output: &str) -> Vec<SlurmAccounting> {
        let mut items = Vec::new();
        for line in output.lines() {
            let mut fields = line.split('|');
            let (Some(job_id), Some(state), Some(exit)) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            if job_id.is_empty() || !job_id.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            let exit_code = exit
                .split(':')
                .next()
                .and_then(|code| code.parse().ok())
                .unwrap_or(-1);
            items.push(SlurmAccounting {
                batch_job_id: job_id.to_string(),
                state: state.to_string(),
                exit_code,
            });
        }
        items
    }

    /// `sbatch` prints `Submitted batch job <id>`; the id is the trailing
    /// integer.
    pub(crate) fn parse_sbatch(output: &str) -> Result<String, DriverError> {
        output
            .trim()
            .rsplit(' ')
            .next()
            .filter(|token| !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string)
            .ok_or_else(|| DriverError::Backend(format!("cannot parse sbatch output: {output:?}")))
    }
}

#[async_trait]
impl SlurmClient for ShellSlurmClient {
    async fn sbatch(&self, job: &Job) -> Result<String, DriverError> {
        let batchfile = job
            .data
            .path("batchfile")
            .ok_or_else(|| DriverError::Backend(format!("{job} has no batch file")))?;
        let mut cmd = Command::new("sbatch");
        cmd.arg(&batchfile);
        let out = run_checked(cmd, SUBMIT_TIMEOUT, "sbatch")
            .await
            .map_err(DriverError::Backend)?;
        tracing::debug!(output = %out.trim(), "sbatch");
        Self::parse_sbatch(&out)
    }

    async fn sacct(&self, jobs: &[Job]) -> Result<Vec<SlurmAccounting>, DriverError> {
        let ids: Vec<&str> = jobs
            .iter()
            .filter_map(|job| job.batch_job_id.as_deref())
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(count = ids.len(), "querying sacct");
        // Bound the accounting window; anything older is long terminal.
        let starttime = (Utc::now() - Days::new(7)).format("%Y-%m-%d").to_string();
        let mut cmd = Command::new("sacct");
        cmd.args(["--brief", "--noheader", "--parsable2", "--starttime"])
            .arg(&starttime)
            .arg("--jobs")
            .arg(ids.join(","));
        let out = run_checked(cmd, QUERY_TIMEOUT, "sacct")
            .await
            .map_err(DriverError::Backend)?;
        Ok(Self::parse_sacct(&out))
    }

    async fn scancel(&self, job: &Job) -> Result<(), DriverError> {
        let batch_job_id = job
            .batch_job_id
            .as_deref()
            .ok_or_else(|| DriverError::Backend(format!("{job} has no batch job id")))?;
        let mut cmd = Command::new("scancel");
        cmd.arg(batch_job_id);
        run_checked(cmd, CANCEL_TIMEOUT, "scancel")
            .await
            .map_err(DriverError::Backend)?;
        Ok(())
    }
}

fn jobscript(job: &Job, values: &StageValues) -> String {
    format!(
        r#"#!/usr/bin/env bash

export KONG_JOB_ID={job_id}
export KONG_JOB_OUTPUT_DIR={output_dir}
export KONG_JOB_LOG_DIR={log_dir}
export KONG_JOB_NPROC={cores}
export KONG_JOB_SCRATCHDIR=/localscratch/${{SLURM_JOB_ID}}/

mkdir -p $KONG_JOB_SCRATCHDIR

stdout={stdout}

({command}) > $stdout 2>&1
"#,
        job_id = job.job_id,
        output_dir = values.output_dir,
        log_dir = values.log_dir,
        cores = job.cores,
        stdout = values.stdout,
        command = job.command,
    )
}

fn batchfile(job: &Job, values: &StageValues) -> String {
    let mut text = format!(
        r#"#!/bin/bash
#SBATCH -J {name}
#SBATCH -o {slurm_out}
#SBATCH -p {queue}

#SBATCH -n {ntasks}
#SBATCH -N {nnodes}
#SBATCH -c {cores}
#SBATCH --mem-per-cpu {memory}M
#SBATCH -t {walltime}
"#,
        name = values.name,
        slurm_out = values.slurm_out,
        queue = values.queue,
        ntasks = values.ntasks,
        nnodes = values.nnodes,
        cores = job.cores,
        memory = job.memory,
        walltime = values.walltime,
    );
    if let Some(licenses) = &values.licenses {
        text.push_str(&format!("#SBATCH -L {licenses}\n"));
    }
    text.push_str(&format!(
        "\n#SBATCH -A {account}\n\nsrun --export=NONE {jobscript}\n",
        account = values.account,
        jobscript = values.jobscript,
    ));
    text
}

struct StageValues {
    name: String,
    queue: String,
    account: String,
    walltime: String,
    licenses: Option<String>,
    ntasks: u32,
    nnodes: u32,
    stdout: String,
    slurm_out: String,
    jobscript: String,
    output_dir: String,
    log_dir: String,
}

/// Slurm [`BatchBackend`]: stages batch files and delegates the primitives
/// to the client.
pub struct SlurmBackend {
    config: Config,
    slurm: SlurmConfig,
    client: Arc<dyn SlurmClient>,
}

impl SlurmBackend {
    pub fn new(config: Config, client: Arc<dyn SlurmClient>) -> Result<Self, DriverError> {
        let slurm = config.slurm()?.clone();
        Ok(Self {
            config,
            slurm,
            client,
        })
    }
}

#[async_trait]
impl BatchBackend for SlurmBackend {
    fn kind(&self) -> DriverKind {
        DriverKind::Slurm
    }

    async fn stage(
        &self,
        store: &Store,
        folder: &Folder,
        spec: JobSpec,
    ) -> Result<Job, DriverError> {
        let mut job = store.insert_job(NewJob {
            // The id is only known once the scheduler accepts the job.
            batch_job_id: None,
            driver: DriverKind::Slurm,
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
        let slurm_out = log_dir.join("slurm_out.txt");
        let batchfile_path = log_dir.join("batchfile.sh");
        let jobscript_path = log_dir.join("jobscript.sh");

        let values = StageValues {
            name: spec
                .name
                .unwrap_or_else(|| format!("kong_job_{}", job.job_id)),
            queue: spec.queue.unwrap_or_else(|| self.slurm.default_queue.clone()),
            account: self.slurm.account.clone(),
            walltime: spec.walltime.to_string(),
            licenses: spec.licenses,
            ntasks: spec.ntasks,
            nnodes: spec.nnodes,
            stdout: stdout.display().to_string(),
            slurm_out: slurm_out.display().to_string(),
            jobscript: jobscript_path.display().to_string(),
            output_dir: output_dir.display().to_string(),
            log_dir: log_dir.display().to_string(),
        };

        job.data.set_path("stdout", &stdout);
        job.data.set_path("slurm_out", &slurm_out);
        job.data.set_path("jobscript", &jobscript_path);
        job.data.set_path("batchfile", &batchfile_path);
        job.data.set_path("output_dir", &output_dir);
        job.data.set_path("log_dir", &log_dir);
        job.data.set_str("name", values.name.clone());
        job.data.set_str("queue", values.queue.clone());
        job.data.set_i64("nnodes", values.nnodes as i64);
        job.data.set_i64("ntasks", values.ntasks as i64);
        job.data.set_i64("exit_code", 0);
        job.data.set_str("walltime", values.walltime.clone());
        job.data.set_str("account", values.account.clone());
        if let Some(licenses) = &values.licenses {
            job.data.set_str("licenses", licenses.clone());
        }

        std::fs::write(&batchfile_path, batchfile(&job, &values))?;
        std::fs::write(&jobscript_path, jobscript(&job, &values))?;
        layout::make_executable(&jobscript_path)?;

        Ok(store.update_job(&job)?)
    }

    async fn submit_one(&self, job: &Job) -> Result<String, DriverError> {
        self.client.sbatch(job).await
    }

    async fn query_many(&self, jobs: &[Job]) -> Result<Vec<AccountingItem>, DriverError> {
        let items = self.client.sacct(jobs).await?;
        Ok(items
            .into_iter()
            .map(|item| {
                let status = map_state(&item.state, item.exit_code);
                AccountingItem::new(item.batch_job_id, status, item.exit_code)
            })
            .collect())
    }

    async fn cancel_one(&self, job: &Job) -> Result<(), DriverError> {
        self.client.scancel(job).await
    }
}

/// The Slurm driver: the shared batch core over [`SlurmBackend`].
pub type SlurmDriver = BatchDriver<SlurmBackend>;

impl SlurmDriver {
    pub fn with_client(
        config: &Config,
        store: &Store,
        client: Arc<dyn SlurmClient>,
    ) -> Result<Self, DriverError> {
        Ok(BatchDriver::new(
            store.clone(),
            SlurmBackend::new(config.clone(), client)?,
        ))
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeSlurmClient;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Scripted Slurm client: queued sacct responses, sequential sbatch ids,
    /// recorded cancellations.
    #[derive(Default)]
    pub struct FakeSlurmClient {
        responses: Mutex<VecDeque<Vec<SlurmAccounting>>>,
        last: Mutex<Vec<SlurmAccounting>>,
        next_id: AtomicU64,
        pub cancelled: Mutex<Vec<String>>,
    }

    impl FakeSlurmClient {
        pub fn new() -> Self {
            Self {
                next_id: AtomicU64::new(1000),
                ..Self::default()
            }
        }

        /// Queue the response for the next sacct call. Once the queue runs
        /// dry the most recent response keeps repeating.
        pub fn push_sacct(&self, items: Vec<(String, &str, i64)>) {
            let items = items
                .into_iter()
                .map(|(id, state, exit_code)| SlurmAccounting {
                    batch_job_id: id,
                    state: state.to_string(),
                    exit_code,
                })
                .collect();
            self.responses.lock().push_back(items);
        }
    }

    #[async_trait]
    impl SlurmClient for FakeSlurmClient {
        async fn sbatch(&self, _job: &Job) -> Result<String, DriverError> {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst).to_string())
        }

        async fn sacct(&self, _jobs: &[Job]) -> Result<Vec<SlurmAccounting>, DriverError> {
            let mut last = self.last.lock();
            if let Some(items) = self.responses.lock().pop_front() {
                *last = items;
            }
            Ok(last.clone())
        }

        async fn scancel(&self, job: &Job) -> Result<(), DriverError> {
            if let Some(id) = &job.batch_job_id {
                self.cancelled.lock().push(id.clone());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "slurm_tests.rs"]
mod tests;
