// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row identifier newtypes

/// Define a newtype ID wrapper around a store-assigned `i64` rowid.
///
/// Generates `new()`, `value()`, `Display`, `From<i64>` and comparison
/// implementations. The wrapped value is the SQLite rowid; `0` never occurs
/// for a persisted row.
#[macro_export]
macro_rules! define_row_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn value(&self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_row_id! {
    /// Identifier of a folder row.
    pub struct FolderId;
}

define_row_id! {
    /// Identifier of a job row. This is the user-visible handle; the
    /// scheduler-side handle is the job's `batch_job_id`.
    pub struct JobId;
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
