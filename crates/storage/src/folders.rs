// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Folder operations: tree CRUD, path resolution, recursive descent.

use crate::jobs::map_job;
use crate::store::{timestamp_from_sql, timestamp_to_sql, StorageError, Store, SELECT_CHUNK};
use chrono::Utc;
use kong_core::{validate_folder_name, Folder, FolderId, Job, JobStatus, ROOT_NAME};
use rusqlite::{params, Row};
use std::collections::BTreeMap;

pub(crate) const FOLDER_COLS: &str = "folder_id, name, parent_id, created_at, updated_at";

pub(crate) fn map_folder(row: &Row<'_>) -> rusqlite::Result<(i64, String, Option<i64>, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

pub(crate) fn folder_from_parts(
    (folder_id, name, parent_id, created_at, updated_at): (i64, String, Option<i64>, String, String),
) -> Result<Folder, StorageError> {
    Ok(Folder {
        folder_id: FolderId::new(folder_id),
        name,
        parent: parent_id.map(FolderId::new),
        created_at: timestamp_from_sql(&created_at)?,
        updated_at: timestamp_from_sql(&updated_at)?,
    })
}

impl Store {
    /// Get the root folder, creating it on first use.
    ///
    /// This is the single place allowed to insert a folder with a null
    /// parent; the partial unique index guarantees there is never a second
    /// one. The name check is bypassed here and nowhere else.
    pub fn root(&self) -> Result<Folder, StorageError> {
        if let Some(folder) = self.root_row()? {
            return Ok(folder);
        }
        let now = timestamp_to_sql(Utc::now());
        self.lock().execute(
            "INSERT INTO folder (name, parent_id, created_at, updated_at) VALUES (?1, NULL, ?2, ?2)",
            params![ROOT_NAME, now],
        )?;
        self.root_row()?
            .ok_or(StorageError::NotFound("folder", 0))
    }

    fn root_row(&self) -> Result<Option<Folder>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FOLDER_COLS} FROM folder WHERE parent_id IS NULL"
        ))?;
        let mut rows = stmt.query_map([], map_folder)?;
        rows.next().transpose()?.map(folder_from_parts).transpose()
    }

    /// Create a folder under `parent`. The name must pass
    /// [`validate_folder_name`]; a duplicate `(parent, name)` is a database
    /// error surfaced as [`StorageError::Sqlite`].
    pub fn create_folder(&self, parent: FolderId, name: &str) -> Result<Folder, StorageError> {
        validate_folder_name(name)?;
        let now = timestamp_to_sql(Utc::now());
        let conn = self.lock();
        conn.execute(
            "INSERT INTO folder (name, parent_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![name, parent.value(), now],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.folder(FolderId::new(id))?
            .ok_or(StorageError::NotFound("folder", id))
    }

    pub fn folder(&self, id: FolderId) -> Result<Option<Folder>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FOLDER_COLS} FROM folder WHERE folder_id = ?1"
        ))?;
        let mut rows = stmt.query_map([id.value()], map_folder)?;
        rows.next().transpose()?.map(folder_from_parts).transpose()
    }

    /// Direct subfolder of `parent` by name.
    pub fn subfolder(&self, parent: FolderId, name: &str) -> Result<Option<Folder>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FOLDER_COLS} FROM folder WHERE parent_id = ?1 AND name = ?2"
        ))?;
        let mut rows = stmt.query_map(params![parent.value(), name], map_folder)?;
        rows.next().transpose()?.map(folder_from_parts).transpose()
    }

    /// Direct children of `parent`, ordered by name.
    pub fn children(&self, parent: FolderId) -> Result<Vec<Folder>, StorageError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FOLDER_COLS} FROM folder WHERE parent_id = ?1 ORDER BY name"
        ))?;
        let rows = stmt.query_map([parent.value()], map_folder)?;
        let mut folders = Vec::new();
        for row in rows {
            folders.push(folder_from_parts(row?)?);
        }
        Ok(folders)
    }

    /// Absolute path of a folder: `/` for the root, otherwise the `/`-joined
    /// ancestor names.
    pub fn folder_path(&self, folder: &Folder) -> Result<String, StorageError> {
        let mut names = Vec::new();
        let mut current = folder.clone();
        while let Some(parent_id) = current.parent {
            names.push(current.name.clone());
            current = self
                .folder(parent_id)?
                .ok_or(StorageError::NotFound("folder", parent_id.value()))?;
        }
        names.reverse();
        Ok(format!("/{}", names.join("/")))
    }

    /// Resolve a POSIX-style path relative to `cwd` (absolute paths resolve
    /// from the root). Returns `Ok(None)` for a simply-missing path.
    pub fn find_by_path(&self, cwd: &Folder, path: &str) -> Result<Option<Folder>, StorageError> {
        if path == "/" {
            return Ok(Some(self.root()?));
        }
        if let Some(rest) = path.strip_prefix('/') {
            let root = self.root()?;
            return self.find_by_path(&root, rest);
        }
        let path = path.strip_suffix('/').unwrap_or(path);
        if path == ".." {
            return match cwd.parent {
                Some(parent) => self.folder(parent),
                None => Ok(None),
            };
        }
        if path.is_empty() || path == "." {
            return Ok(Some(cwd.clone()));
        }
        match path.split_once('/') {
            None => self.subfolder(cwd.folder_id, path),
            Some((head, tail)) => {
                let next = if head == ".." {
                    match cwd.parent {
                        Some(parent) => self.folder(parent)?,
                        None => return Ok(None),
                    }
                } else {
                    self.subfolder(cwd.folder_id, head)?
                };
                match next {
                    Some(next) => self.find_by_path(&next, tail),
                    None => Ok(None),
                }
            }
        }
    }

    /// Rename and/or reparent a folder. Validates the name and rejects a
    /// folder becoming its own parent; the root cannot be updated this way.
    pub fn update_folder(&self, folder: &Folder) -> Result<Folder, StorageError> {
        validate_folder_name(&folder.name)?;
        let parent = folder.parent.ok_or(StorageError::MissingParent)?;
        if parent == folder.folder_id {
            return Err(StorageError::OwnParent);
        }
        let now = timestamp_to_sql(Utc::now());
        self.lock().execute(
            "UPDATE folder SET name = ?1, parent_id = ?2, updated_at = ?3 WHERE folder_id = ?4",
            params![folder.name, parent.value(), now, folder.folder_id.value()],
        )?;
        self.folder(folder.folder_id)?
            .ok_or(StorageError::NotFound("folder", folder.folder_id.value()))
    }

    /// Move several folders under `dest` in one atomic update. `dest` itself
    /// is skipped if it appears in the set.
    pub fn move_folders(&self, ids: &[FolderId], dest: FolderId) -> Result<(), StorageError> {
        let ids: Vec<i64> = ids
            .iter()
            .filter(|id| **id != dest)
            .map(|id| id.value())
            .collect();
        let dest = dest.value();
        let now = timestamp_to_sql(Utc::now());
        self.with_txn(|txn| {
            for chunk in ids.chunks(SELECT_CHUNK) {
                let placeholders = placeholders(chunk.len());
                let sql = format!(
                    "UPDATE folder SET parent_id = ?, updated_at = ? WHERE folder_id IN ({placeholders})"
                );
                let mut stmt = txn.prepare(&sql)?;
                let mut params: Vec<&dyn rusqlite::ToSql> = vec![&dest, &now];
                for id in chunk {
                    params.push(id);
                }
                stmt.execute(params.as_slice())?;
            }
            Ok(())
        })
    }

    /// Delete a folder together with all descendant folders and jobs, in one
    /// transaction. External artifacts are the drivers' concern and must be
    /// removed before calling this.
    pub fn delete_folder_recursive(&self, id: FolderId) -> Result<(), StorageError> {
        let mut folder_ids: Vec<i64> = self
            .folders_recursive(id)?
            .into_iter()
            .map(|f| f.folder_id.value())
            .collect();
        folder_ids.push(id.value());
        self.with_txn(|txn| {
            for chunk in folder_ids.chunks(SELECT_CHUNK) {
                let placeholders = placeholders(chunk.len());
                txn.execute(
                    &format!("DELETE FROM job WHERE folder_id IN ({placeholders})"),
                    rusqlite::params_from_iter(chunk.iter()),
                )?;
                txn.execute(
                    &format!("DELETE FROM folder WHERE folder_id IN ({placeholders})"),
                    rusqlite::params_from_iter(chunk.iter()),
                )?;
            }
            Ok(())
        })
    }

    /// All folders strictly below `id`, ordered by id. One recursive CTE
    /// query on SQLite ≥ 3.8.3, otherwise an in-memory walk; both return the
    /// same set.
    pub fn folders_recursive(&self, id: FolderId) -> Result<Vec<Folder>, StorageError> {
        if Self::supports_recursive_cte() {
            self.folders_recursive_cte(id)
        } else {
            let mut folders = Vec::new();
            self.folders_recursive_walk(id, &mut folders)?;
            folders.sort_by_key(|f| f.folder_id);
            Ok(folders)
        }
    }

    pub(crate) fn folders_recursive_cte(&self, id: FolderId) -> Result<Vec<Folder>, StorageError> {
        let conn = self.lock();
        let sql = format!(
            "WITH RECURSIVE children(n) AS ( \
               VALUES(?1) \
               UNION SELECT folder_id FROM folder, children WHERE folder.parent_id = children.n \
             ) \
             SELECT {FOLDER_COLS} FROM folder \
             WHERE folder_id IN children AND folder_id != ?1 ORDER BY folder_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([id.value()], map_folder)?;
        let mut folders = Vec::new();
        for row in rows {
            folders.push(folder_from_parts(row?)?);
        }
        Ok(folders)
    }

    pub(crate) fn folders_recursive_walk(
        &self,
        id: FolderId,
        into: &mut Vec<Folder>,
    ) -> Result<(), StorageError> {
        for child in self.children(id)? {
            let child_id = child.folder_id;
            into.push(child);
            self.folders_recursive_walk(child_id, into)?;
        }
        Ok(())
    }

    /// All jobs in `id` and its descendants, ordered by job id.
    pub fn jobs_recursive(&self, id: FolderId) -> Result<Vec<Job>, StorageError> {
        if Self::supports_recursive_cte() {
            self.jobs_recursive_cte(id)
        } else {
            let mut jobs = self.jobs_in_folder(id)?;
            for folder in self.folders_recursive(id)? {
                jobs.extend(self.jobs_in_folder(folder.folder_id)?);
            }
            jobs.sort_by_key(|j| j.job_id);
            Ok(jobs)
        }
    }

    pub(crate) fn jobs_recursive_cte(&self, id: FolderId) -> Result<Vec<Job>, StorageError> {
        let conn = self.lock();
        let sql = format!(
            "WITH RECURSIVE children(n) AS ( \
               VALUES(?1) \
               UNION SELECT folder_id FROM folder, children WHERE folder.parent_id = children.n \
             ) \
             SELECT {} FROM job WHERE folder_id IN children ORDER BY job_id",
            crate::jobs::JOB_COLS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([id.value()], map_job)?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(crate::jobs::job_from_parts(row?)?);
        }
        Ok(jobs)
    }

    /// Status counts over `id` and its descendants. Every status appears in
    /// the result, zero-valued when absent.
    pub fn job_stats(&self, id: FolderId) -> Result<BTreeMap<JobStatus, u64>, StorageError> {
        let mut counts: BTreeMap<JobStatus, u64> =
            JobStatus::ALL.into_iter().map(|s| (s, 0)).collect();
        if Self::supports_recursive_cte() {
            let conn = self.lock();
            let sql = "WITH RECURSIVE children(n) AS ( \
                         VALUES(?1) \
                         UNION SELECT folder_id FROM folder, children WHERE folder.parent_id = children.n \
                       ) \
                       SELECT status, count(*) FROM job WHERE folder_id IN children GROUP BY status";
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map([id.value()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (wire, count) = row?;
                let status = JobStatus::from_wire(wire)
                    .ok_or_else(|| StorageError::Corrupt(format!("bad status value {wire}")))?;
                counts.insert(status, count as u64);
            }
        } else {
            for job in self.jobs_recursive(id)? {
                *counts.entry(job.status).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}

pub(crate) fn placeholders(n: usize) -> String {
    let mut out = String::new();
    for i in 0..n {
        if i > 0 {
            out.push(',');
        }
        out.push('?');
    }
    out
}

#[cfg(test)]
#[path = "folders_tests.rs"]
mod tests;
