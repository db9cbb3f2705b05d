// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTCondor driver.
//!
//! Live jobs are visible through `condor_q`; finished jobs only through
//! `condor_history` over a user log file that every kong job shares. Both
//! are queried with a JSON attribute projection. The shared log keeps
//! growing, and once it is rotated away finished-but-unsynced jobs can no
//! longer be reconciled, so an oversized log draws a warning at driver
//! construction.

use crate::batch::{AccountingItem, BatchBackend, BatchDriver};
use crate::driver::{DriverError, JobSpec};
use crate::layout;
use crate::subprocess::{run_checked, CANCEL_TIMEOUT, QUERY_TIMEOUT, SUBMIT_TIMEOUT};
use async_trait::async_trait;
use kong_core::{Config, DriverKind, Folder, HtCondorConfig, Job, JobStatus};
use kong_storage::{NewJob, Store};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;

/// Warn once the shared user log passes this size.
const LOG_WARN_BYTES: u64 = 50_000_000;

/// One row of a condor_q/condor_history JSON response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CondorJobRow {
    pub cluster_id: i64,
    pub proc_id: i64,
    pub job_status: i64,
    /// Absent while the job has not finished.
    pub exit_code: Option<i64>,
}

/// Map the numeric JobStatus attribute onto the internal status
/// (see the HTCondor manual's job status table).
///
/// A scheduler-level COMPLETED with a real non-zero exit code is a failure;
/// `-1` stands for "no exit code reported".
pub(crate) fn map_condor_status(job_status: i64, exit_code: i64) -> JobStatus {
    let status = match job_status {
        // 0 Unexpanded, 1 Idle
        0 | 1 => JobStatus::Submitted,
        // 2 Running
        2 => JobStatus::Running,
        // 3 Removed, 5 Held, 6 Submission error
        3 | 5 | 6 => JobStatus::Failed,
        // 4 Completed
        4 => JobStatus::Completed,
        _ => JobStatus::Unknown,
    };
    if status == JobStatus::Completed && exit_code != 0 && exit_code != -1 {
        JobStatus::Failed
    } else {
        status
    }
}

/// The HTCondor primitives.
#[async_trait]
pub trait CondorClient: Send + Sync {
    /// Submit the job's submit file, returning the allocated cluster id.
    async fn condor_submit(&self, job: &Job) -> Result<String, DriverError>;

    /// The live queue.
    async fn condor_q(&self) -> Result<Vec<CondorJobRow>, DriverError>;

    /// Finished jobs recorded in the shared user log.
    async fn condor_history(&self, log_file: &Path) -> Result<Vec<CondorJobRow>, DriverError>;

    async fn condor_rm(&self, job: &Job) -> Result<(), DriverError>;
}

/// Client that shells out to the real HTCondor tools.
#[derive(Debug, Default)]
pub struct ShellCondorClient;

impl ShellCondorClient {
    /// Parse the `-json` output of condor_q/condor_history. An empty output
    /// means an empty queue, not an error.
    pub(crate) fn parse_rows(output: &str) -> Result<Vec<CondorJobRow>, DriverError> {
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }
        let items: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(output)
            .map_err(|e| DriverError::Backend(format!("cannot parse condor JSON: {e}")))?;
        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            let get = |key: &str| item.get(key).and_then(serde_json::Value::as_i64);
            let (Some(cluster_id), Some(job_status)) = (get("ClusterId"), get("JobStatus")) else {
                return Err(DriverError::Backend(format!(
                    "condor row without ClusterId/JobStatus: {item:?}"
                )));
            };
            rows.push(CondorJobRow {
                cluster_id,
                proc_id: get("ProcId").unwrap_or(0),
                job_status,
                exit_code: get("ExitCode"),
            });
        }
        Ok(rows)
    }

    /// `condor_submit` reports `… submitted to cluster <n>.`
    pub(crate) fn parse_submit(output: &str) -> Result<String, DriverError> {
        output
            .trim()
            .strip_suffix('.')
            .and_then(|text| text.rsplit(' ').next())
            .filter(|token| !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string)
            .ok_or_else(|| {
                DriverError::Backend(format!("cannot parse condor_submit output: {output:?}"))
            })
    }
}

#[async_trait]
impl CondorClient for ShellCondorClient {
    async fn condor_submit(&self, job: &Job) -> Result<String, DriverError> {
        let batchfile = job
            .data
            .path("batchfile")
            .ok_or_else(|| DriverError::Backend(format!("{job} has no submit file")))?;
        let mut cmd = Command::new("condor_submit");
        cmd.arg(&batchfile);
        let out = run_checked(cmd, SUBMIT_TIMEOUT, "condor_submit")
            .await
            .map_err(DriverError::Backend)?;
        tracing::debug!(output = %out.trim(), "condor_submit");
        Self::parse_submit(&out)
    }

    async fn condor_q(&self) -> Result<Vec<CondorJobRow>, DriverError> {
        let mut cmd = Command::new("condor_q");
        cmd.args(["-attributes", "ClusterId,ProcId,JobStatus", "-json"]);
        let out = run_checked(cmd, QUERY_TIMEOUT, "condor_q")
            .await
            .map_err(DriverError::Backend)?;
        Self::parse_rows(&out)
    }

    async fn condor_history(&self, log_file: &Path) -> Result<Vec<CondorJobRow>, DriverError> {
        if !log_file.exists() {
            tracing::debug!("user log does not exist yet, skipping condor_history");
            return Ok(Vec::new());
        }
        let mut cmd = Command::new("condor_history");
        cmd.arg("-userlog")
            .arg(log_file)
            .args([
                "-attributes",
                "ClusterId,ProcId,JobStatus,ExitCode",
                "-json",
                "-limit",
                "10000",
            ]);
        let out = run_checked(cmd, QUERY_TIMEOUT, "condor_history")
            .await
            .map_err(DriverError::Backend)?;
        Self::parse_rows(&out)
    }

    async fn condor_rm(&self, job: &Job) -> Result<(), DriverError> {
        let batch_job_id = job
            .batch_job_id
            .as_deref()
            .ok_or_else(|| DriverError::Backend(format!("{job} has no batch job id")))?;
        let mut cmd = Command::new("condor_rm");
        cmd.arg(batch_job_id);
        run_checked(cmd, CANCEL_TIMEOUT, "condor_rm")
            .await
            .map_err(DriverError::Backend)?;
        Ok(())
    }
}

fn jobscript(job: &Job, stdout: &Path, output_dir: &Path, log_dir: &Path) -> String {
    format!(
        r#"#!/usr/bin/env bash

export KONG_JOB_ID={job_id}
export KONG_JOB_OUTPUT_DIR={output_dir}
export KONG_JOB_LOG_DIR={log_dir}
export KONG_JOB_NPROC={cores}
export KONG_JOB_SCRATCHDIR=$_CONDOR_SCRATCH_DIR
export HTCONDOR_CLUSTER_ID=$(grep "^ClusterId" $_CONDOR_JOB_AD | cut -d= - -f2 | awk '{{$1=$1}};1')

mkdir -p $KONG_JOB_SCRATCHDIR

stdout={stdout}

({command}) > $stdout 2>&1
"#,
        job_id = job.job_id,
        output_dir = output_dir.display(),
        log_dir = log_dir.display(),
        cores = job.cores,
        stdout = stdout.display(),
        command = job.command,
    )
}

fn submitfile(
    job: &Job,
    universe: &str,
    name: &str,
    walltime_secs: u64,
    log_file: &Path,
    jobscript: &Path,
    submitfile_extra: &str,
) -> String {
    format!(
        r#"universe = {universe}
log = {log}
executable = {jobscript}
request_cpus = {cores}
request_memory = {memory}
batch_name = {name}
+MaxRuntime = {walltime}

{submitfile_extra}

queue 1
"#,
        universe = universe,
        log = log_file.display(),
        jobscript = jobscript.display(),
        cores = job.cores,
        memory = job.memory,
        name = name,
        walltime = walltime_secs,
        submitfile_extra = submitfile_extra,
    )
}

/// HTCondor [`BatchBackend`].
pub struct CondorBackend {
    config: Config,
    condor: HtCondorConfig,
    client: Arc<dyn CondorClient>,
    log_file: PathBuf,
}

impl CondorBackend {
    pub fn new(config: Config, client: Arc<dyn CondorClient>) -> Result<Self, DriverError> {
        let condor = config.htcondor()?.clone();
        let log_file = config.htcondor_log_file();
        if let Some(parent) = log_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Ok(meta) = std::fs::metadata(&log_file) {
            if meta.len() > LOG_WARN_BYTES {
                tracing::warn!(
                    log_file = %log_file.display(),
                    size = meta.len(),
                    "HTCondor user log is large; consider deleting it. Finished but \
                     unsynced jobs will not be able to be updated after that."
                );
            }
        }
        Ok(Self {
            config,
            condor,
            client,
            log_file,
        })
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }
}

#[async_trait]
impl BatchBackend for CondorBackend {
    fn kind(&self) -> DriverKind {
        DriverKind::HtCondor
    }

    async fn stage(
        &self,
        store: &Store,
        folder: &Folder,
        spec: JobSpec,
    ) -> Result<Job, DriverError> {
        let mut job = store.insert_job(NewJob {
            batch_job_id: None,
            driver: DriverKind::HtCondor,
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
        let batchfile_path = log_dir.join("batchfile.sh");
        let jobscript_path = log_dir.join("jobscript.sh");

        let universe = spec
            .universe
            .unwrap_or_else(|| self.condor.default_universe.clone());
        let name = spec
            .name
            .unwrap_or_else(|| format!("kong_job_{}", job.job_id));
        let walltime_secs = spec.walltime.total_seconds();

        job.data.set_path("stdout", &stdout);
        job.data.set_path("htcondor_out", &self.log_file);
        job.data.set_path("jobscript", &jobscript_path);
        job.data.set_path("batchfile", &batchfile_path);
        job.data.set_path("output_dir", &output_dir);
        job.data.set_path("log_dir", &log_dir);
        job.data.set_str("name", name.clone());
        job.data.set_i64("exit_code", 0);
        job.data.set_str("universe", universe.clone());
        job.data.set_i64("walltime", walltime_secs as i64);
        job.data
            .set_str("submitfile_extra", self.condor.submitfile_extra.clone());

        std::fs::write(
            &batchfile_path,
            submitfile(
                &job,
                &universe,
                &name,
                walltime_secs,
                &self.log_file,
                &jobscript_path,
                &self.condor.submitfile_extra,
            ),
        )?;
        std::fs::write(
            &jobscript_path,
            jobscript(&job, &stdout, &output_dir, &log_dir),
        )?;
        layout::make_executable(&jobscript_path)?;

        Ok(store.update_job(&job)?)
    }

    async fn submit_one(&self, job: &Job) -> Result<String, DriverError> {
        self.client.condor_submit(job).await
    }

    async fn query_many(&self, _jobs: &[Job]) -> Result<Vec<AccountingItem>, DriverError> {
        let mut rows = self.client.condor_q().await?;
        rows.extend(self.client.condor_history(&self.log_file).await?);
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            if row.proc_id != 0 {
                return Err(DriverError::Backend(format!(
                    "cluster {} has more than one process, which is not supported",
                    row.cluster_id
                )));
            }
            let exit_code = row.exit_code.unwrap_or(-1);
            items.push(AccountingItem::new(
                row.cluster_id.to_string(),
                map_condor_status(row.job_status, exit_code),
                exit_code,
            ));
        }
        Ok(items)
    }

    async fn cancel_one(&self, job: &Job) -> Result<(), DriverError> {
        self.client.condor_rm(job).await
    }
}

/// The HTCondor driver: the shared batch core over [`CondorBackend`].
pub type HtCondorDriver = BatchDriver<CondorBackend>;

impl HtCondorDriver {
    pub fn with_client(
        config: &Config,
        store: &Store,
        client: Arc<dyn CondorClient>,
    ) -> Result<Self, DriverError> {
        Ok(BatchDriver::new(
            store.clone(),
            CondorBackend::new(config.clone(), client)?,
        ))
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeCondorClient;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Scripted HTCondor client: separate queues for the live set and the
    /// history, sequential cluster ids, recorded removals. Once a queue runs
    /// dry its most recent response keeps repeating.
    #[derive(Default)]
    struct Scripted {
        queued: Mutex<VecDeque<Vec<CondorJobRow>>>,
        last: Mutex<Vec<CondorJobRow>>,
    }

    impl Scripted {
        fn next(&self) -> Vec<CondorJobRow> {
            let mut last = self.last.lock();
            if let Some(rows) = self.queued.lock().pop_front() {
                *last = rows;
            }
            last.clone()
        }
    }

    #[derive(Default)]
    pub struct FakeCondorClient {
        queue: Scripted,
        history: Scripted,
        next_id: AtomicU64,
        pub removed: Mutex<Vec<String>>,
    }

    impl FakeCondorClient {
        pub fn new() -> Self {
            Self {
                next_id: AtomicU64::new(500),
                ..Self::default()
            }
        }

        pub fn push_q(&self, rows: Vec<(i64, i64, Option<i64>)>) {
            self.queue.queued.lock().push_back(Self::rows(rows));
        }

        pub fn push_q_raw(&self, rows: Vec<CondorJobRow>) {
            self.queue.queued.lock().push_back(rows);
        }

        pub fn push_history(&self, rows: Vec<(i64, i64, Option<i64>)>) {
            self.history.queued.lock().push_back(Self::rows(rows));
        }

        fn rows(rows: Vec<(i64, i64, Option<i64>)>) -> Vec<CondorJobRow> {
            rows.into_iter()
                .map(|(cluster_id, job_status, exit_code)| CondorJobRow {
                    cluster_id,
                    proc_id: 0,
                    job_status,
                    exit_code,
                })
                .collect()
        }
    }

    #[async_trait]
    impl CondorClient for FakeCondorClient {
        async fn condor_submit(&self, _job: &Job) -> Result<String, DriverError> {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst).to_string())
        }

        async fn condor_q(&self) -> Result<Vec<CondorJobRow>, DriverError> {
            Ok(self.queue.next())
        }

        async fn condor_history(&self, _log_file: &Path) -> Result<Vec<CondorJobRow>, DriverError> {
            Ok(self.history.next())
        }

        async fn condor_rm(&self, job: &Job) -> Result<(), DriverError> {
            if let Some(id) = &job.batch_job_id {
                self.removed.lock().push(id.clone());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "htcondor_tests.rs"]
mod tests;
