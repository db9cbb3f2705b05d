// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Panda grid driver.
//!
//! Grid tasks are created and submitted by external tooling; kong only
//! tracks them. A job row records the externally allocated task id, and
//! reconciliation pulls task states from the Panda monitoring API. The
//! mutation surface (kill, resubmit, cleanup, remove, streams) is therefore
//! unsupported, and "submission" merely flips the local status.

use crate::driver::{
    check_driver, CleanupProgress, Driver, DriverError, JobSpec, OutputHandle, WaitOptions,
    WaitProgress,
};
use crate::executor::Executor;
use crate::layout;
use crate::wait::poll_wait;
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use kong_core::{Clock, Config, DriverKind, Folder, Job, JobStatus, SystemClock};
use kong_storage::{NewJob, Store};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Map a Panda task status word onto the internal status.
pub(crate) fn map_task_status(status: &str) -> JobStatus {
    match status {
        "done" => JobStatus::Completed,
        "broken" | "failed" | "finished" | "aborting" | "aborted" | "finishing" | "tobroken"
        | "exhausted" | "passed" => JobStatus::Failed,
        "registered" | "defined" | "assigning" | "ready" | "pending" | "scouting" | "scouted"
        | "topreprocess" | "preprocessing" | "toretry" | "toincexec" | "rerefine" | "paused"
        | "throttled" => JobStatus::Submitted,
        "running" | "prepared" => JobStatus::Running,
        _ => JobStatus::Unknown,
    }
}

/// Query surface of the Panda monitoring API.
#[async_trait]
pub trait PandaClient: Send + Sync {
    /// Fetch raw task records for the given task ids.
    async fn query_tasks(&self, task_ids: &[String]) -> Result<Vec<Map<String, Value>>, DriverError>;
}

/// Client for the bigpanda monitoring REST endpoint.
#[derive(Debug, Default)]
pub struct HttpPandaClient {
    base_url: String,
}

impl HttpPandaClient {
    pub fn new() -> Self {
        Self {
            base_url: "https://bigpanda.cern.ch".to_string(),
        }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PandaClient for HttpPandaClient {
    async fn query_tasks(&self, task_ids: &[String]) -> Result<Vec<Map<String, Value>>, DriverError> {
        if task_ids.is_empty() {
            return Ok(Vec::new());
        }
        let base = if self.base_url.is_empty() {
            "https://bigpanda.cern.ch"
        } else {
            &self.base_url
        };
        let url = format!("{}/tasks/?jeditaskid={}&json", base, task_ids.join("|"));
        tracing::debug!(%url, "querying panda monitor");
        let client = reqwest::Client::new();
        let response = client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| DriverError::Backend(format!("panda query failed: {e}")))?;
        let tasks: Vec<Map<String, Value>> = response
            .json()
            .await
            .map_err(|e| DriverError::Backend(format!("cannot parse panda response: {e}")))?;
        Ok(tasks)
    }
}

fn parse_panda_time(value: Option<&Value>) -> Option<chrono::DateTime<Utc>> {
    let text = value?.as_str()?;
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

pub struct PandaDriver<C: Clock = SystemClock> {
    store: Store,
    config: Config,
    client: Arc<dyn PandaClient>,
    clock: C,
}

impl PandaDriver<SystemClock> {
    pub fn new(
        config: Config,
        store: Store,
        client: Arc<dyn PandaClient>,
    ) -> Result<Self, DriverError> {
        Self::with_clock(config, store, client, SystemClock)
    }
}

impl<C: Clock> PandaDriver<C> {
    pub fn with_clock(
        config: Config,
        store: Store,
        client: Arc<dyn PandaClient>,
        clock: C,
    ) -> Result<Self, DriverError> {
        // The grid section must be configured even though the monitor client
        // does not need it: the task ids in it come from the grid submission
        // environment it describes.
        config.prun()?;
        Ok(Self {
            store,
            config,
            client,
            clock,
        })
    }

    /// Apply one task record to its job row. Returns the updated row, or
    /// `None` if the task id is not in the database.
    fn apply_task(&self, item: &Map<String, Value>) -> Result<Option<Job>, DriverError> {
        let task_id = match item.get("jeditaskid") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => return Ok(None),
        };
        let Some(mut job) = self.store.job_by_batch_id(&task_id, DriverKind::Panda)? else {
            return Ok(None);
        };

        let status_word = item.get("status").and_then(Value::as_str).unwrap_or("");
        job.status = map_task_status(status_word);

        // A "done" task can still have failed files behind it.
        if let Some(dsinfo) = item.get("dsinfo") {
            let failed = dsinfo.get("nfilesfailed").and_then(Value::as_i64).unwrap_or(0);
            if failed > 0 {
                tracing::debug!(%job, failed, "task has failed files");
                job.status = JobStatus::Failed;
            }
        }
        if item
            .get("scoutinghascritfailures")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            tracing::debug!(%job, "task reports critical scouting failures");
            job.status = JobStatus::Failed;
        }

        let mut extra = item.clone();
        extra.remove("jeditaskid");
        job.data.merge(extra);
        job.data.set_str(
            "url",
            format!("https://bigpanda.cern.ch/task/{task_id}"),
        );

        // The scheduler's clock is authoritative for these rows.
        if let Some(created) = parse_panda_time(item.get("creationdate")) {
            job.created_at = created;
        }
        if let Some(updated) = parse_panda_time(item.get("statechangetime")) {
            job.updated_at = updated;
        }
        Ok(Some(job))
    }
}

#[async_trait]
impl<C: Clock> Driver for PandaDriver<C> {
    fn kind(&self) -> DriverKind {
        DriverKind::Panda
    }

    async fn create_job(&self, folder: &Folder, spec: JobSpec) -> Result<Job, DriverError> {
        if spec.command.is_empty() {
            return Err(DriverError::InvalidSpec("command must not be empty".into()));
        }
        let task_id = spec
            .task_id
            .clone()
            .ok_or_else(|| DriverError::InvalidSpec("grid jobs need a task id".into()))?;
        let mut job = self.store.insert_job(NewJob {
            batch_job_id: Some(task_id),
            driver: DriverKind::Panda,
            folder_id: folder.folder_id,
            command: spec.command.clone(),
            cores: spec.cores,
            memory: spec.memory,
        })?;

        let log_dir = layout::log_dir(&self.config.jobdir, job.job_id);
        std::fs::create_dir_all(&log_dir)?;
        job.data.set_path("log_dir", &log_dir);

        Ok(self.store.update_job(&job)?)
    }

    async fn sync_status(&self, job: &mut Job) -> Result<(), DriverError> {
        check_driver(DriverKind::Panda, job)?;
        let synced = self.bulk_sync_status(vec![job.clone()]).await?;
        *job = synced
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::Backend("job vanished during sync".into()))?;
        Ok(())
    }

    async fn bulk_sync_status(&self, jobs: Vec<Job>) -> Result<Vec<Job>, DriverError> {
        tracing::debug!(count = jobs.len(), "bulk status sync");
        for job in &jobs {
            check_driver(DriverKind::Panda, job)?;
        }
        let task_ids: Vec<String> = jobs
            .iter()
            .filter_map(|job| job.batch_job_id.clone())
            .collect();
        let items = self.client.query_tasks(&task_ids).await?;

        let mut updated = Vec::new();
        let mut not_found = 0usize;
        for item in &items {
            match self.apply_task(item)? {
                Some(job) => updated.push(job),
                None => not_found += 1,
            }
        }
        if not_found > 0 {
            tracing::info!(not_found, "panda reported tasks that are not in the database");
        }
        self.store.update_jobs(&updated)?;
        for job in &updated {
            self.store.set_job_times(job)?;
        }

        let ids: Vec<_> = jobs.iter().map(|job| job.job_id).collect();
        Ok(self.store.jobs_by_ids(&ids)?)
    }

    async fn submit(&self, job: &mut Job) -> Result<(), DriverError> {
        check_driver(DriverKind::Panda, job)?;
        if job.status != JobStatus::Created {
            return Err(DriverError::InvalidStatus(format!(
                "cannot submit {job} in status {}",
                job.status
            )));
        }
        tracing::info!(%job, "grid submission happens externally; recording status only");
        job.status = JobStatus::Submitted;
        *job = self.store.update_job(job)?;
        Ok(())
    }

    async fn bulk_submit(&self, _jobs: Vec<Job>) -> Result<Vec<Job>, DriverError> {
        Err(DriverError::Unsupported("bulk submission of grid tasks"))
    }

    async fn kill(&self, _job: &mut Job) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("killing grid tasks"))
    }

    async fn bulk_kill(&self, _jobs: Vec<Job>) -> Result<Vec<Job>, DriverError> {
        Err(DriverError::Unsupported("killing grid tasks"))
    }

    async fn wait(
        &self,
        jobs: Vec<Job>,
        opts: WaitOptions,
        progress: Option<WaitProgress>,
    ) -> Result<Vec<Job>, DriverError> {
        for job in &jobs {
            check_driver(DriverKind::Panda, job)?;
        }
        poll_wait(self, &self.clock, jobs, &opts, progress.as_ref()).await
    }

    async fn resubmit(&self, _job: &mut Job) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("resubmitting grid tasks"))
    }

    async fn bulk_resubmit(
        &self,
        _jobs: Vec<Job>,
        _do_submit: bool,
    ) -> Result<Vec<Job>, DriverError> {
        Err(DriverError::Unsupported("resubmitting grid tasks"))
    }

    async fn cleanup(&self, _job: &mut Job) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("cleaning up grid tasks"))
    }

    async fn bulk_cleanup(
        &self,
        _jobs: Vec<Job>,
        _executor: Executor,
        _progress: Option<CleanupProgress>,
    ) -> Result<Vec<Job>, DriverError> {
        Err(DriverError::Unsupported("cleaning up grid tasks"))
    }

    async fn remove(&self, _job: Job) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("removing grid tasks"))
    }

    async fn bulk_remove(&self, _jobs: Vec<Job>, _do_cleanup: bool) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("removing grid tasks"))
    }

    async fn stdout(&self, _job: &mut Job) -> Result<OutputHandle, DriverError> {
        Err(DriverError::Unsupported("grid task logs live on the grid"))
    }

    async fn stderr(&self, _job: &mut Job) -> Result<OutputHandle, DriverError> {
        Err(DriverError::Unsupported("grid task logs live on the grid"))
    }
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakePandaClient;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Scripted Panda client. Once the queue runs dry the most recent
    /// response keeps repeating.
    #[derive(Default)]
    pub struct FakePandaClient {
        responses: Mutex<VecDeque<Vec<Map<String, Value>>>>,
        last: Mutex<Vec<Map<String, Value>>>,
    }

    impl FakePandaClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_tasks(&self, tasks: Vec<Value>) {
            let tasks = tasks
                .into_iter()
                .filter_map(|task| match task {
                    Value::Object(map) => Some(map),
                    _ => None,
                })
                .collect();
            self.responses.lock().push_back(tasks);
        }
    }

    #[async_trait]
    impl PandaClient for FakePandaClient {
        async fn query_tasks(
            &self,
            _task_ids: &[String],
        ) -> Result<Vec<Map<String, Value>>, DriverError> {
            let mut last = self.last.lock();
            if let Some(tasks) = self.responses.lock().pop_front() {
                *last = tasks;
            }
            Ok(last.clone())
        }
    }
}

#[cfg(test)]
#[path = "panda_tests.rs"]
mod tests;
