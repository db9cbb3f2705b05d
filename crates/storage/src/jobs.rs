// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job operations: CRUD, chunked bulk reads, transactional bulk writes.

use crate::folders::placeholders;
use crate::store::{timestamp_from_sql, timestamp_to_sql, StorageError, Store, SELECT_CHUNK, UPDATE_CHUNK};
use chrono::Utc;
use kong_core::{DriverKind, Folder, FolderId, Job, JobData, JobId, JobStatus};
use rusqlite::{params, Row};

pub(crate) const JOB_COLS: &str = "job_id, batch_job_id, driver, folder_id, command, data, \
                                   cores, memory, status, created_at, updated_at";

type RawJob = (
    i64,
    Option<String>,
    String,
    i64,
    String,
    String,
    i64,
    i64,
    i64,
    String,
    String,
);

pub(crate) fn map_job(row: &Row<'_>) -> rusqlite::Result<RawJob> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

pub(crate) fn job_from_parts(raw: RawJob) -> Result<Job, StorageError> {
    let (job_id, batch_job_id, driver, folder_id, command, data, cores, memory, status, created_at, updated_at) =
        raw;
    let driver: DriverKind = driver
        .parse()
        .map_err(|e| StorageError::Corrupt(format!("job {job_id}: {e}")))?;
    let status = JobStatus::from_wire(status)
        .ok_or_else(|| StorageError::Corrupt(format!("job {job_id}: bad status value {status}")))?;
    let data: JobData = serde_json::from_str(&data)?;
    Ok(Job {
        job_id: JobId::new(job_id),
        batch_job_id,
        driver,
        folder_id: FolderId::new(folder_id),
        command,
        data,
        cores: cores as u32,
        memory: memory as u32,
        status,
        created_at: timestamp_from_sql(&created_at)?,
        updated_at: timestamp_from_sql(&updated_at)?,
    })
}

/// Fields of a job row assigned by the creating driver; everything else is
/// filled in by the store.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub batch_job_id: Option<String>,
    pub driver: DriverKind,
    pub folder_id: FolderId,
    pub command: String,
    pub cores: u32,
    pub memory: u32,
}

impl Store {
    /// Insert a job row in status CREATED with empty data.
    pub fn insert_job(&self, new: NewJob) -> Result<Job, StorageError> {
        let now = timestamp_to_sql(Utc::now());
        let conn = self.lock();
        conn.execute(
            "INSERT INTO job (batch_job_id, driver, folder_id, command, data, cores, memory, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, '{}', ?5, ?6, ?7, ?8, ?8)",
            params![
                new.batch_job_id,
                new.driver.tag(),
                new.folder_id.value(),
                new.command,
                new.cores,
                new.memory,
                JobStatus::Created.as_wire(),
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.job(JobId::new(id))?
            .ok_or(StorageError::NotFound("job", id))
    }

    pub fn job(&self, id: JobId) -> Result<Option<Job>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("SELECT {JOB_COLS} FROM job WHERE job_id = ?1"))?;
        let mut rows = stmt.query_map([id.value()], map_job)?;
        rows.next().transpose()?.map(job_from_parts).transpose()
    }

    /// Look a job up by its back-end handle. The `(batch_job_id, driver)`
    /// pair is unique, so at most one row matches.
    pub fn job_by_batch_id(
        &self,
        batch_job_id: &str,
        driver: DriverKind,
    ) -> Result<Option<Job>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLS} FROM job WHERE batch_job_id = ?1 AND driver = ?2"
        ))?;
        let mut rows = stmt.query_map(params![batch_job_id, driver.tag()], map_job)?;
        rows.next().transpose()?.map(job_from_parts).transpose()
    }

    /// Fetch jobs by id, in id order. The `IN` list is chunked to stay under
    /// the bound-parameter limit; missing ids are silently absent from the
    /// result.
    pub fn jobs_by_ids(&self, ids: &[JobId]) -> Result<Vec<Job>, StorageError> {
        let conn = self.lock();
        let mut jobs = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(SELECT_CHUNK) {
            let placeholders = placeholders(chunk.len());
            let sql =
                format!("SELECT {JOB_COLS} FROM job WHERE job_id IN ({placeholders}) ORDER BY job_id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(chunk.iter().map(|id| id.value())),
                map_job,
            )?;
            for row in rows {
                jobs.push(job_from_parts(row?)?);
            }
        }
        jobs.sort_by_key(|j| j.job_id);
        Ok(jobs)
    }

    /// Direct jobs of a folder, in id order.
    pub fn jobs_in_folder(&self, folder: FolderId) -> Result<Vec<Job>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLS} FROM job WHERE folder_id = ?1 ORDER BY job_id"
        ))?;
        let rows = stmt.query_map([folder.value()], map_job)?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(job_from_parts(row?)?);
        }
        Ok(jobs)
    }

    /// Persist the driver-mutable fields (`batch_job_id`, `status`, `data`)
    /// of every given job in one transaction, bumping `updated_at`.
    pub fn update_jobs(&self, jobs: &[Job]) -> Result<(), StorageError> {
        let now = timestamp_to_sql(Utc::now());
        self.with_txn(|txn| {
            for chunk in jobs.chunks(UPDATE_CHUNK) {
                let mut stmt = txn.prepare(
                    "UPDATE job SET batch_job_id = ?1, status = ?2, data = ?3, updated_at = ?4 \
                     WHERE job_id = ?5",
                )?;
                for job in chunk {
                    let data = serde_json::to_string(&job.data)?;
                    stmt.execute(params![
                        job.batch_job_id,
                        job.status.as_wire(),
                        data,
                        now,
                        job.job_id.value(),
                    ])?;
                }
            }
            Ok(())
        })
    }

    /// Persist a single job's driver-mutable fields and return the reloaded
    /// row.
    pub fn update_job(&self, job: &Job) -> Result<Job, StorageError> {
        self.update_jobs(std::slice::from_ref(job))?;
        self.job(job.job_id)?
            .ok_or(StorageError::NotFound("job", job.job_id.value()))
    }

    /// Overwrite timestamps a back-end is authoritative for (the grid driver
    /// adopts scheduler creation/update times).
    pub fn set_job_times(&self, job: &Job) -> Result<(), StorageError> {
        self.lock().execute(
            "UPDATE job SET created_at = ?1, updated_at = ?2 WHERE job_id = ?3",
            params![
                timestamp_to_sql(job.created_at),
                timestamp_to_sql(job.updated_at),
                job.job_id.value(),
            ],
        )?;
        Ok(())
    }

    /// Set the status of the given jobs in one transaction (the scoped reset
    /// used by resubmission).
    pub fn reset_status(&self, ids: &[JobId], status: JobStatus) -> Result<(), StorageError> {
        let now = timestamp_to_sql(Utc::now());
        let status = status.as_wire();
        self.with_txn(|txn| {
            for chunk in ids.chunks(UPDATE_CHUNK) {
                let placeholders = placeholders(chunk.len());
                let sql = format!(
                    "UPDATE job SET status = ?, updated_at = ? WHERE job_id IN ({placeholders})"
                );
                let mut stmt = txn.prepare(&sql)?;
                let mut params: Vec<&dyn rusqlite::ToSql> = vec![&status, &now];
                let ids: Vec<i64> = chunk.iter().map(|id| id.value()).collect();
                for id in &ids {
                    params.push(id);
                }
                stmt.execute(params.as_slice())?;
            }
            Ok(())
        })
    }

    /// Move jobs into `dest` in one atomic update.
    pub fn move_jobs(&self, ids: &[JobId], dest: &Folder) -> Result<(), StorageError> {
        let dest = dest.folder_id.value();
        let now = timestamp_to_sql(Utc::now());
        self.with_txn(|txn| {
            for chunk in ids.chunks(SELECT_CHUNK) {
                let placeholders = placeholders(chunk.len());
                let sql = format!(
                    "UPDATE job SET folder_id = ?, updated_at = ? WHERE job_id IN ({placeholders})"
                );
                let mut stmt = txn.prepare(&sql)?;
                let mut params: Vec<&dyn rusqlite::ToSql> = vec![&dest, &now];
                let ids: Vec<i64> = chunk.iter().map(|id| id.value()).collect();
                for id in &ids {
                    params.push(id);
                }
                stmt.execute(params.as_slice())?;
            }
            Ok(())
        })
    }

    /// Delete job rows by id, chunked, in one transaction.
    pub fn delete_jobs(&self, ids: &[JobId]) -> Result<(), StorageError> {
        self.with_txn(|txn| {
            for chunk in ids.chunks(SELECT_CHUNK) {
                let placeholders = placeholders(chunk.len());
                txn.execute(
                    &format!("DELETE FROM job WHERE job_id IN ({placeholders})"),
                    rusqlite::params_from_iter(chunk.iter().map(|id| id.value())),
                )?;
            }
            Ok(())
        })
    }

    /// Total number of job rows (diagnostics and tests).
    pub fn count_jobs(&self) -> Result<u64, StorageError> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT count(*) FROM job", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
