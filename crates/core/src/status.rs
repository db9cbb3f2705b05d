// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job status machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a job.
///
/// The discriminants are the wire values stored in the `status` column.
/// Declaration order matches the numeric order, so the derived `Ord` gives
/// the guard semantics used by submission (`status > Created` means the job
/// has already left the creation stage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum JobStatus {
    /// Row exists, scripts are on disk, nothing handed to a back-end yet.
    Created = 0,
    /// Handed to the back-end, not yet observed running.
    Submitted = 1,
    /// Observed running by the back-end.
    Running = 2,
    /// Finished unsuccessfully, was killed, or was cancelled.
    Failed = 3,
    /// Finished with exit code zero.
    Completed = 4,
    /// The back-end has no (or no longer any) information about the job.
    Unknown = 5,
}

impl JobStatus {
    /// All statuses, in wire-value order.
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Created,
        JobStatus::Submitted,
        JobStatus::Running,
        JobStatus::Failed,
        JobStatus::Completed,
        JobStatus::Unknown,
    ];

    /// Terminal statuses never change without an explicit resubmit.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Failed | JobStatus::Completed | JobStatus::Unknown
        )
    }

    /// A live job is one the back-end may still be working on.
    pub fn is_live(&self) -> bool {
        matches!(self, JobStatus::Submitted | JobStatus::Running)
    }

    /// Wire value stored in the database.
    pub fn as_wire(&self) -> i64 {
        *self as i64
    }

    /// Parse a wire value back into a status.
    pub fn from_wire(value: i64) -> Option<JobStatus> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_wire() == value)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Created => write!(f, "CREATED"),
            JobStatus::Submitted => write!(f, "SUBMITTED"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
