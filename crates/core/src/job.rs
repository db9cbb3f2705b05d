// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job rows and their driver-owned data bag.

use crate::driver::DriverKind;
use crate::id::{FolderId, JobId};
use crate::status::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

/// Opaque per-job key-value data.
///
/// The contents are the owning driver's concern: paths to scripts and output
/// directories, the recorded pid, the last observed exit code, scheduler
/// metadata. Keys a driver does not know about must survive a load/store
/// cycle unchanged, so the map is kept as parsed JSON rather than a typed
/// struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobData(pub Map<String, Value>);

impl JobData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), Value::String(value.into()));
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn set_i64(&mut self, key: impl Into<String>, value: i64) {
        self.0.insert(key.into(), Value::from(value));
    }

    /// Read a key as a filesystem path.
    pub fn path(&self, key: &str) -> Option<PathBuf> {
        self.str(key).map(PathBuf::from)
    }

    pub fn set_path(&mut self, key: impl Into<String>, value: &Path) {
        self.set_str(key, value.to_string_lossy().into_owned());
    }

    /// Merge scheduler metadata into the bag, overwriting existing keys.
    pub fn merge(&mut self, other: Map<String, Value>) {
        for (key, value) in other {
            self.0.insert(key, value);
        }
    }

    /// Exit code as reported by the back-end, if any.
    pub fn exit_code(&self) -> Option<i64> {
        self.i64("exit_code")
    }
}

/// A job row.
///
/// `job_id` is the local handle assigned at creation; `batch_job_id` is the
/// back-end handle and stays `None` until submission for drivers that only
/// learn it then. The row is routable to exactly one driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub batch_job_id: Option<String>,
    pub driver: DriverKind,
    pub folder_id: FolderId,
    pub command: String,
    pub data: JobData,
    pub cores: u32,
    pub memory: u32,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Log directory recorded by the owning driver at creation.
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.data.path("log_dir")
    }

    /// Output directory recorded by the owning driver at creation.
    pub fn output_dir(&self) -> Option<PathBuf> {
        self.data.path("output_dir")
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Job<{}, {}, {}>",
            self.job_id,
            self.batch_job_id.as_deref().unwrap_or("-"),
            self.status
        )
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
