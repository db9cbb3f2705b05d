// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The orchestration session: cwd, selector resolution, bulk dispatch.

use crate::notify::{self, Notify};
use crate::select::{self, Selector, Tail};
use kong_core::{Config, ConfigError, DriverKind, Folder, Job, JobStatus};
use kong_drivers::{registry, Driver, DriverError, JobSpec, WaitOptions, WaitProgress};
use kong_storage::{StorageError, Store};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no such folder or job: {0}")]
    DoesNotExist(String),
    #[error("cannot create: {0}")]
    CannotCreate(String),
    #[error("cannot remove the root folder")]
    CannotRemoveRoot,
    #[error("{0} matches folders; removing folders needs recursive")]
    CannotRemoveIsFolder(String),
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Confirmation callback that always says yes.
pub fn always_confirm(_summary: &str) -> bool {
    true
}

/// What a [`Session::mv`] touched.
#[derive(Debug, Default)]
pub struct Moved {
    pub folders: Vec<Folder>,
    pub jobs: Vec<Job>,
}

impl Moved {
    pub fn len(&self) -> usize {
        self.folders.len() + self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.jobs.is_empty()
    }
}

/// The per-process orchestration object.
pub struct Session {
    store: Store,
    config: Config,
    cwd: Folder,
    drivers: Mutex<HashMap<DriverKind, Arc<dyn Driver>>>,
    notifiers: Vec<Arc<dyn Notify>>,
}

impl Session {
    /// Open the store recorded in the config and start at the root folder.
    pub fn open(config: Config) -> Result<Self, SessionError> {
        let store = Store::open(&config.db_file())?;
        Self::new(config, store)
    }

    /// Build a session over an existing store, with notifiers taken from the
    /// config.
    pub fn new(config: Config, store: Store) -> Result<Self, SessionError> {
        let notifiers = notify::from_config(&config);
        Self::with_notifiers(config, store, notifiers)
    }

    pub fn with_notifiers(
        config: Config,
        store: Store,
        notifiers: Vec<Arc<dyn Notify>>,
    ) -> Result<Self, SessionError> {
        let cwd = store.root()?;
        Ok(Self {
            store,
            config,
            cwd,
            drivers: Mutex::new(HashMap::new()),
            notifiers,
        })
    }

    pub fn cwd(&self) -> &Folder {
        &self.cwd
    }

    pub fn cwd_path(&self) -> Result<String, SessionError> {
        Ok(self.store.folder_path(&self.cwd)?)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The driver instance for a kind, constructed once per session.
    pub fn driver(&self, kind: DriverKind) -> Result<Arc<dyn Driver>, SessionError> {
        let mut drivers = self.drivers.lock();
        if let Some(driver) = drivers.get(&kind) {
            return Ok(driver.clone());
        }
        let driver = registry::build(kind, &self.config, &self.store)?;
        drivers.insert(kind, driver.clone());
        Ok(driver)
    }

    pub fn default_driver(&self) -> Result<Arc<dyn Driver>, SessionError> {
        self.driver(self.config.default_driver)
    }

    /// Pre-seed the driver cache, bypassing the registry. Lets tests wire
    /// in drivers built around fake back-end clients.
    #[cfg(any(test, feature = "test-support"))]
    pub fn inject_driver(&self, kind: DriverKind, driver: Arc<dyn Driver>) {
        self.drivers.lock().insert(kind, driver);
    }

    // ------------------------------------------------------------------
    // namespace operations

    /// List a folder: its direct subfolders and jobs. With `refresh` the
    /// jobs are reconciled first; `recursive` widens the refresh to the
    /// whole subtree.
    pub async fn ls(
        &self,
        path: &str,
        refresh: bool,
        recursive: bool,
    ) -> Result<(Vec<Folder>, Vec<Job>), SessionError> {
        let folder = self
            .store
            .find_by_path(&self.cwd, path)?
            .ok_or_else(|| SessionError::DoesNotExist(path.to_string()))?;
        let folders = self.store.children(folder.folder_id)?;
        let jobs = if refresh {
            let jobs = if recursive {
                self.store.jobs_recursive(folder.folder_id)?
            } else {
                self.store.jobs_in_folder(folder.folder_id)?
            };
            self.refresh_jobs(jobs).await?
        } else {
            self.store.jobs_in_folder(folder.folder_id)?
        };
        Ok((folders, jobs))
    }

    /// Run `f` with the working folder temporarily switched to `target`;
    /// the previous cwd is restored afterwards, also when `f` bails early.
    pub fn pushd<T>(
        &mut self,
        target: &str,
        f: impl FnOnce(&mut Session) -> T,
    ) -> Result<T, SessionError> {
        let previous = self.cwd.clone();
        self.cd(target)?;
        let result = f(self);
        self.cwd = previous;
        Ok(result)
    }

    /// Change the working folder. The empty string goes to the root.
    pub fn cd(&mut self, target: &str) -> Result<(), SessionError> {
        self.cwd = if target.is_empty() {
            self.store.root()?
        } else {
            self.store
                .find_by_path(&self.cwd, target)?
                .ok_or_else(|| SessionError::DoesNotExist(target.to_string()))?
        };
        Ok(())
    }

    /// Create a folder. `exist_ok` tolerates an existing folder at the
    /// path; `create_parent` creates missing intermediate folders.
    pub fn mkdir(
        &self,
        path: &str,
        exist_ok: bool,
        create_parent: bool,
    ) -> Result<Folder, SessionError> {
        tracing::debug!(path, "mkdir");
        if let Some(existing) = self.store.find_by_path(&self.cwd, path)? {
            if exist_ok {
                return Ok(existing);
            }
            return Err(SessionError::CannotCreate(format!(
                "folder already exists at {path}"
            )));
        }

        let (head, tail) = select::split_head_tail(path);
        let location = if create_parent && !head.is_empty() {
            self.mkdir_parents(&head)?
        } else {
            self.store.find_by_path(&self.cwd, &head)?
        };
        let location = location
            .ok_or_else(|| SessionError::CannotCreate(format!("cannot create folder at {path}")))?;

        tracing::debug!(name = tail, parent = %location.folder_id, "creating folder");
        Ok(self.store.create_folder(location.folder_id, tail)?)
    }

    fn mkdir_parents(&self, path: &str) -> Result<Option<Folder>, SessionError> {
        if let Some(folder) = self.store.find_by_path(&self.cwd, path)? {
            return Ok(Some(folder));
        }
        let (head, tail) = select::split_head_tail(path);
        let parent = if head.is_empty() {
            Some(self.cwd.clone())
        } else {
            self.mkdir_parents(&head)?
        };
        let Some(parent) = parent else {
            return Ok(None);
        };
        if let Some(existing) = self.store.subfolder(parent.folder_id, tail)? {
            return Ok(Some(existing));
        }
        Ok(Some(self.store.create_folder(parent.folder_id, tail)?))
    }

    /// Move folders or jobs. The source may be an exact folder path, a
    /// folder glob, a job selector, or a mix (globs can match both); the
    /// destination is an existing folder ("move into") or, for a single
    /// folder source, a non-existent path whose parent exists ("rename").
    pub fn mv(&self, source: &str, dest: &str) -> Result<Moved, SessionError> {
        if let Some(folder) = self.store.find_by_path(&self.cwd, source)? {
            self.mv_folder(&folder, dest)?;
            return Ok(Moved {
                folders: vec![self
                    .store
                    .folder(folder.folder_id)?
                    .ok_or_else(|| SessionError::DoesNotExist(source.to_string()))?],
                jobs: Vec::new(),
            });
        }

        // Not an exact folder: try jobs and folder globs independently.
        let jobs = match self.get_jobs(source, false) {
            Ok(jobs) => jobs,
            Err(SessionError::InvalidSelector(_)) => Vec::new(),
            Err(other) => return Err(other),
        };
        let folders = match self.get_folders(source) {
            Ok(folders) => folders,
            Err(SessionError::InvalidSelector(_)) => Vec::new(),
            Err(other) => return Err(other),
        };
        if folders.is_empty() && jobs.is_empty() {
            return Err(SessionError::DoesNotExist(source.to_string()));
        }

        if !jobs.is_empty() {
            self.mv_jobs(&jobs, dest)?;
        }
        if !folders.is_empty() {
            let dest_folder = self
                .store
                .find_by_path(&self.cwd, dest)?
                .ok_or_else(|| SessionError::DoesNotExist(dest.to_string()))?;
            let ids: Vec<_> = folders.iter().map(|f| f.folder_id).collect();
            self.store.move_folders(&ids, dest_folder.folder_id)?;
        }
        Ok(Moved { folders, jobs })
    }

    /// Move one folder into `dest`, or rename it when `dest` does not
    /// exist but its parent does.
    pub fn mv_folder(&self, source: &Folder, dest: &str) -> Result<(), SessionError> {
        let mut updated = source.clone();
        if let Some(dest_folder) = self.store.find_by_path(&self.cwd, dest)? {
            updated.parent = Some(dest_folder.folder_id);
        } else {
            let (head, tail) = select::split_head_tail(dest);
            let parent = self
                .store
                .find_by_path(&self.cwd, &head)?
                .ok_or_else(|| SessionError::DoesNotExist(head.to_string()))?;
            updated.name = tail.to_string();
            updated.parent = Some(parent.folder_id);
        }
        self.store.update_folder(&updated)?;
        Ok(())
    }

    /// Move jobs into an existing folder. Jobs cannot be renamed, so the
    /// destination must resolve.
    pub fn mv_jobs(&self, jobs: &[Job], dest: &str) -> Result<(), SessionError> {
        let dest_folder = self.store.find_by_path(&self.cwd, dest)?.ok_or_else(|| {
            SessionError::InvalidSelector(format!(
                "{dest} does not exist, and jobs cannot be renamed"
            ))
        })?;
        let ids: Vec<_> = jobs.iter().map(|job| job.job_id).collect();
        Ok(self.store.move_jobs(&ids, &dest_folder)?)
    }

    /// Remove folders and/or jobs matched by `target`. Folder matches need
    /// `recursive`; the root is never removable. The confirmation callback
    /// runs once with a summary; `false` aborts with no side effects.
    pub async fn rm(
        &self,
        target: &str,
        recursive: bool,
        confirm: impl Fn(&str) -> bool + Send + Sync,
    ) -> Result<bool, SessionError> {
        if target == "/" {
            return Err(SessionError::CannotRemoveRoot);
        }

        let folders = match self.get_folders(target) {
            Ok(folders) => folders,
            Err(SessionError::InvalidSelector(_)) => Vec::new(),
            Err(other) => return Err(other),
        };
        if folders.iter().any(|folder| folder.is_root()) {
            return Err(SessionError::CannotRemoveRoot);
        }
        if !folders.is_empty() && !recursive {
            return Err(SessionError::CannotRemoveIsFolder(target.to_string()));
        }

        let mut jobs = Vec::new();
        for folder in &folders {
            jobs.extend(self.store.jobs_recursive(folder.folder_id)?);
        }
        match self.get_jobs(target, false) {
            Ok(selected) => jobs.extend(selected),
            Err(SessionError::InvalidSelector(_)) => {}
            Err(other) => return Err(other),
        }

        if folders.is_empty() && jobs.is_empty() {
            return Err(SessionError::DoesNotExist(target.to_string()));
        }

        if !confirm(&format!(
            "Remove {} folder(s) and {} job(s)?",
            folders.len(),
            jobs.len()
        )) {
            return Ok(false);
        }

        for (kind, group) in group_by_driver(jobs) {
            self.driver(kind)?.bulk_remove(group, true).await?;
        }
        for folder in &folders {
            self.store.delete_folder_recursive(folder.folder_id)?;
        }
        Ok(true)
    }

    // ------------------------------------------------------------------
    // job lifecycle

    /// Create a job in the current folder with the default driver.
    pub async fn create_job(&self, spec: JobSpec) -> Result<Job, SessionError> {
        Ok(self.default_driver()?.create_job(&self.cwd, spec).await?)
    }

    /// Submit the selected jobs, grouped per owning driver.
    pub async fn submit_job(
        &self,
        selector: &str,
        recursive: bool,
        confirm: impl Fn(&str) -> bool + Send + Sync,
    ) -> Result<(), SessionError> {
        let jobs = self.select_for_bulk(selector, recursive)?;
        if !confirm(&format!("Submit {} job(s)?", jobs.len())) {
            return Ok(());
        }
        for (kind, group) in group_by_driver(jobs) {
            self.driver(kind)?.bulk_submit(group).await?;
        }
        Ok(())
    }

    /// Kill the selected jobs, grouped per owning driver.
    pub async fn kill_job(
        &self,
        selector: &str,
        recursive: bool,
        confirm: impl Fn(&str) -> bool + Send + Sync,
    ) -> Result<(), SessionError> {
        let jobs = self.select_for_bulk(selector, recursive)?;
        if !confirm(&format!("Kill {} job(s)?", jobs.len())) {
            return Ok(());
        }
        for (kind, group) in group_by_driver(jobs) {
            self.driver(kind)?.bulk_kill(group).await?;
        }
        Ok(())
    }

    /// Resubmit the selected jobs; with `failed_only` the selection is
    /// narrowed to FAILED jobs after resolution.
    pub async fn resubmit_job(
        &self,
        selector: &str,
        recursive: bool,
        failed_only: bool,
        confirm: impl Fn(&str) -> bool + Send + Sync,
    ) -> Result<(), SessionError> {
        let mut jobs = self.get_jobs(selector, recursive)?;
        if failed_only {
            jobs.retain(|job| job.status == JobStatus::Failed);
        }
        if !confirm(&format!("Resubmit {} job(s)?", jobs.len())) {
            return Ok(());
        }
        if jobs.is_empty() {
            return Err(SessionError::DoesNotExist(selector.to_string()));
        }
        for (kind, group) in group_by_driver(jobs) {
            self.driver(kind)?.bulk_resubmit(group, true).await?;
        }
        Ok(())
    }

    /// Wait for the selected jobs to reach terminal states, notifying the
    /// configured providers on completion and on timeout.
    pub async fn wait(
        &self,
        selector: &str,
        recursive: bool,
        opts: WaitOptions,
        progress: Option<WaitProgress>,
    ) -> Result<Vec<Job>, SessionError> {
        let jobs = self.get_jobs(selector, recursive)?;
        if jobs.is_empty() {
            return Err(SessionError::DoesNotExist(selector.to_string()));
        }
        let count = jobs.len();
        let driver = self.driver(jobs[0].driver)?;
        let timeout = opts.timeout;
        match driver.wait(jobs, opts, progress).await {
            Ok(jobs) => {
                let summary = status_summary(&jobs);
                self.notify_all(
                    "kong: Job wait complete",
                    &format!("Successfully waited for {count} job(s) to finish:\n{summary}"),
                )
                .await;
                Ok(jobs)
            }
            Err(DriverError::Timeout(elapsed)) => {
                let seconds = timeout.map(|t| t.as_secs()).unwrap_or_default();
                self.notify_all(
                    "kong: Job wait timeout",
                    &format!("Timeout waiting for {count} job(s) after {seconds}s"),
                )
                .await;
                Err(DriverError::Timeout(elapsed).into())
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Reconcile a job set. Bulk sync through the first job's driver; on a
    /// driver mismatch fall back to syncing jobs one at a time with their
    /// own drivers.
    pub async fn refresh_jobs(&self, jobs: Vec<Job>) -> Result<Vec<Job>, SessionError> {
        tracing::debug!(count = jobs.len(), "refreshing jobs");
        let Some(first) = jobs.first() else {
            return Ok(jobs);
        };
        let driver = self.driver(first.driver)?;
        match driver.bulk_sync_status(jobs.clone()).await {
            Ok(jobs) => Ok(jobs),
            Err(DriverError::Mismatch { .. }) => {
                tracing::debug!("bulk sync failed on mixed drivers, falling back to per-job sync");
                let mut refreshed = Vec::with_capacity(jobs.len());
                for mut job in jobs {
                    self.driver(job.driver)?.sync_status(&mut job).await?;
                    refreshed.push(job);
                }
                Ok(refreshed)
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Recursive status counts for the folder at `path`.
    pub fn status(&self, path: &str) -> Result<BTreeMap<JobStatus, u64>, SessionError> {
        let folder = self
            .store
            .find_by_path(&self.cwd, path)?
            .ok_or_else(|| SessionError::DoesNotExist(path.to_string()))?;
        Ok(self.store.job_stats(folder.folder_id)?)
    }

    // ------------------------------------------------------------------
    // selector resolution

    /// Resolve a job selector. `recursive` additionally allows plain folder
    /// paths, selecting the whole subtree.
    pub fn get_jobs(&self, selector: &str, recursive: bool) -> Result<Vec<Job>, SessionError> {
        match select::parse(selector)? {
            Selector::Id(id) | Selector::Path { tail: Tail::Id(id), .. } => {
                let job = self
                    .store
                    .job(id.into())?
                    .ok_or_else(|| SessionError::DoesNotExist(format!("job {id}")))?;
                Ok(vec![job])
            }
            Selector::Path {
                head,
                tail: Tail::All,
            } => {
                let folders = self.get_folders_of_head(&head)?;
                let mut jobs = Vec::new();
                for folder in folders {
                    jobs.extend(self.store.jobs_in_folder(folder.folder_id)?);
                }
                Ok(jobs)
            }
            Selector::Path {
                head,
                tail: Tail::Range(lo, hi),
            } => {
                let folder = self
                    .store
                    .find_by_path(&self.cwd, &head)?
                    .ok_or_else(|| SessionError::DoesNotExist(head.clone()))?;
                let jobs = self
                    .store
                    .jobs_in_folder(folder.folder_id)?
                    .into_iter()
                    .filter(|job| lo <= job.job_id.value() && job.job_id.value() <= hi)
                    .collect();
                Ok(jobs)
            }
            Selector::Folder(path) => {
                if !recursive {
                    return Err(SessionError::InvalidSelector(format!(
                        "{path} is not understood as a job selector"
                    )));
                }
                let folder = self.store.find_by_path(&self.cwd, &path)?.ok_or_else(|| {
                    SessionError::InvalidSelector(format!(
                        "{path} is not understood as a job selector"
                    ))
                })?;
                Ok(self.store.jobs_recursive(folder.folder_id)?)
            }
        }
    }

    /// Resolve a folder pattern: exact path, or a shell glob in the last
    /// segment matched against the head folder's direct children.
    pub fn get_folders(&self, pattern: &str) -> Result<Vec<Folder>, SessionError> {
        let (head, tail) = select::split_head_tail(pattern);
        if tail.contains('*') || tail.contains('?') {
            let base = if head.is_empty() {
                self.cwd.clone()
            } else {
                self.store
                    .find_by_path(&self.cwd, &head)?
                    .ok_or_else(|| SessionError::InvalidSelector(format!("no folder {head}")))?
            };
            let children = self.store.children(base.folder_id)?;
            if tail == "*" {
                return Ok(children);
            }
            let matcher = select::glob_matcher(tail)?;
            Ok(children
                .into_iter()
                .filter(|folder| matcher.is_match(&folder.name))
                .collect())
        } else {
            let folder = self
                .store
                .find_by_path(&self.cwd, pattern)?
                .ok_or_else(|| SessionError::InvalidSelector(format!("no folder {pattern}")))?;
            Ok(vec![folder])
        }
    }

    /// The folders a `head/*` selector refers to; an empty head is the cwd.
    fn get_folders_of_head(&self, head: &str) -> Result<Vec<Folder>, SessionError> {
        if head.is_empty() {
            return Ok(vec![self.cwd.clone()]);
        }
        self.get_folders(head)
    }

    /// Selection used by submit/kill: recursive mode resolves folder
    /// patterns (globs included) to their whole subtrees.
    fn select_for_bulk(&self, selector: &str, recursive: bool) -> Result<Vec<Job>, SessionError> {
        let jobs = if recursive {
            let folders = self.get_folders(selector)?;
            tracing::debug!(folders = folders.len(), "recursive selection");
            let mut jobs = Vec::new();
            for folder in folders {
                jobs.extend(self.store.jobs_recursive(folder.folder_id)?);
            }
            jobs
        } else {
            self.get_jobs(selector, false)?
        };
        if jobs.is_empty() {
            return Err(SessionError::DoesNotExist(selector.to_string()));
        }
        Ok(jobs)
    }

    async fn notify_all(&self, title: &str, message: &str) {
        for notifier in &self.notifiers {
            if let Err(err) = notifier.notify(title, message).await {
                tracing::warn!(%err, "notification failed");
            }
        }
    }
}

/// Group a job set by owning driver, preserving id order within groups.
fn group_by_driver(jobs: Vec<Job>) -> BTreeMap<DriverKind, Vec<Job>> {
    let mut groups: BTreeMap<DriverKind, Vec<Job>> = BTreeMap::new();
    for job in jobs {
        groups.entry(job.driver).or_default().push(job);
    }
    groups
}

/// One-line status summary like `C2, F1, U0, …`.
fn status_summary(jobs: &[Job]) -> String {
    let mut counts: BTreeMap<JobStatus, usize> =
        JobStatus::ALL.into_iter().map(|s| (s, 0)).collect();
    for job in jobs {
        *counts.entry(job.status).or_insert(0) += 1;
    }
    counts
        .iter()
        .map(|(status, count)| {
            let initial = status.to_string().chars().next().unwrap_or('?');
            format!("{initial}{count}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
