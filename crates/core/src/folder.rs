// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Folder rows of the hierarchical job namespace.

use crate::id::FolderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the root folder. The root is the only row with a null parent and
/// the only name allowed to bypass [`validate_folder_name`] (the store's
/// get-or-create hatch is the single caller that does so).
pub const ROOT_NAME: &str = "root";

/// Rejection reasons for folder names.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FolderNameError {
    #[error("folder name must not be empty")]
    Empty,
    #[error("folder name must not contain '/': {0:?}")]
    ContainsSlash(String),
    #[error("folder name must not be '.' or '..'")]
    Dots,
    #[error("folder name must not be purely numeric: {0:?}")]
    Numeric(String),
}

/// Validate a folder name: non-empty, no `/`, not `.`/`..`, not purely
/// numeric (numeric path segments are reserved for job ids in selectors).
pub fn validate_folder_name(name: &str) -> Result<(), FolderNameError> {
    if name.is_empty() {
        return Err(FolderNameError::Empty);
    }
    if name.contains('/') {
        return Err(FolderNameError::ContainsSlash(name.to_string()));
    }
    if name == "." || name == ".." {
        return Err(FolderNameError::Dots);
    }
    if name.chars().all(|c| c.is_ascii_digit()) {
        return Err(FolderNameError::Numeric(name.to_string()));
    }
    Ok(())
}

/// A folder row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub folder_id: FolderId,
    pub name: String,
    /// `None` only for the root folder.
    pub parent: Option<FolderId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Folder {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[cfg(test)]
#[path = "folder_tests.rs"]
mod tests;
