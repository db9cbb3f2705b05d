// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job filesystem layout.
//!
//! Job directories are sharded two levels deep so a jobdir with tens of
//! thousands of jobs stays listable: job 123 lives under `00/01/000123/`
//! (the first two digit pairs of the zero-padded id).

use kong_core::JobId;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Zero-padded 6-digit form of a job id.
pub fn padded_id(id: JobId) -> String {
    format!("{:06}", id.value())
}

fn sharded(base: &Path, id: JobId, leaf: &str) -> PathBuf {
    let padded = padded_id(id);
    base.join(&padded[0..2]).join(&padded[2..4]).join(leaf)
}

/// Log directory for a job: `<jobdir>/aa/bb/<000id>/`.
pub fn log_dir(jobdir: &Path, id: JobId) -> PathBuf {
    let padded = padded_id(id);
    sharded(jobdir, id, &padded)
}

/// Output directory for a job: `<joboutputdir>/aa/bb/<id>/`.
pub fn output_dir(joboutputdir: &Path, id: JobId) -> PathBuf {
    sharded(joboutputdir, id, &id.value().to_string())
}

/// Remove a directory tree, falling back to `rm -rf` when the library call
/// fails (NFS and similar filesystems reject the rename-based removal).
pub fn rmtree(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "remove_dir_all failed, falling back to rm -rf");
            let status = std::process::Command::new("rm")
                .arg("-rf")
                .arg(path)
                .status()?;
            if status.success() {
                Ok(())
            } else {
                Err(std::io::Error::other(format!(
                    "rm -rf {} exited with {status}",
                    path.display()
                )))
            }
        }
    }
}

/// Mark a script executable for its owner.
pub fn make_executable(path: &Path) -> std::io::Result<()> {
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o100);
    std::fs::set_permissions(path, perms)
}

#[cfg(test)]
#[path = "layout_tests.rs"]
mod tests;
