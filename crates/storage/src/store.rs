// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store handle, schema, and transaction plumbing.

use chrono::{DateTime, Utc};
use kong_core::FolderNameError;
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Maximum number of ids in a single `WHERE … IN (…)` statement. SQLite
/// commonly caps bound parameters at 999.
pub const SELECT_CHUNK: usize = 500;

/// Rows per iteration of a bulk row update.
pub const UPDATE_CHUNK: usize = 50;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt data column: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    InvalidName(#[from] FolderNameError),
    #[error("folder cannot be its own parent")]
    OwnParent,
    #[error("only the root folder may have no parent")]
    MissingParent,
    #[error("{0} not found: {1}")]
    NotFound(&'static str, i64),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

const SCHEMA: &str = r#"
PRAGMA foreign_keys=ON;
CREATE TABLE IF NOT EXISTS folder (
  folder_id  INTEGER PRIMARY KEY AUTOINCREMENT,
  name       TEXT NOT NULL,
  parent_id  INTEGER REFERENCES folder(folder_id) ON DELETE CASCADE,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  UNIQUE(parent_id, name)
);
CREATE UNIQUE INDEX IF NOT EXISTS folder_root ON folder(name) WHERE parent_id IS NULL;
CREATE TABLE IF NOT EXISTS job (
  job_id       INTEGER PRIMARY KEY AUTOINCREMENT,
  batch_job_id TEXT,
  driver       TEXT NOT NULL,
  folder_id    INTEGER NOT NULL REFERENCES folder(folder_id) ON DELETE CASCADE,
  command      TEXT NOT NULL,
  data         TEXT NOT NULL DEFAULT '{}',
  cores        INTEGER NOT NULL DEFAULT 1,
  memory       INTEGER NOT NULL DEFAULT 1000,
  status       INTEGER NOT NULL DEFAULT 0,
  created_at   TEXT NOT NULL,
  updated_at   TEXT NOT NULL,
  UNIQUE(batch_job_id, driver)
);
CREATE INDEX IF NOT EXISTS job_folder ON job(folder_id);
CREATE INDEX IF NOT EXISTS job_batch ON job(batch_job_id);
"#;

/// Handle to the embedded database. Cheap to clone; all clones share one
/// connection behind a mutex (the process is single-owner, the mutex only
/// serializes the worker pool's incidental reads).
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (and create if needed) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::debug!(path = %path.display(), "opening database");
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            // A poisoned lock means another thread panicked mid-operation;
            // the connection itself is still usable and the transaction that
            // was open has rolled back.
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Run `f` inside a single transaction, committing on success.
    pub(crate) fn with_txn<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut conn = self.lock();
        let txn = conn.transaction()?;
        let value = f(&txn)?;
        txn.commit()?;
        Ok(value)
    }

    /// Whether the linked SQLite can run recursive common-table expressions.
    pub(crate) fn supports_recursive_cte() -> bool {
        // Recursive CTEs arrived in SQLite 3.8.3.
        rusqlite::version_number() >= 3_008_003
    }
}

pub(crate) fn timestamp_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn timestamp_from_sql(text: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp {text:?}: {e}")))
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
