// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Walltime values for batch submissions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Upper bound accepted by the schedulers we target.
const MAX_HOURS: u64 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WalltimeError {
    #[error("walltime {0:?} does not match HH:MM:SS")]
    Format(String),
    #[error("walltime of {0} hours or more is not accepted")]
    TooLarge(u64),
}

/// A requested walltime, convertible to the `HH:MM:SS` form batch files use.
///
/// Hours are total hours (a three-day request formats as `72:00:00`).
/// Values of 100 hours or more are rejected on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Walltime(Duration);

impl Walltime {
    pub fn from_duration(duration: Duration) -> Result<Self, WalltimeError> {
        if duration >= Duration::from_secs(MAX_HOURS * 3600) {
            return Err(WalltimeError::TooLarge(duration.as_secs() / 3600));
        }
        Ok(Self(duration))
    }

    pub fn from_minutes(minutes: u64) -> Result<Self, WalltimeError> {
        Self::from_duration(Duration::from_secs(minutes * 60))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    /// Total seconds, as HTCondor's `+MaxRuntime` wants them.
    pub fn total_seconds(&self) -> u64 {
        self.0.as_secs()
    }
}

impl Default for Walltime {
    fn default() -> Self {
        // 30 minutes, the submission default.
        Self(Duration::from_secs(30 * 60))
    }
}

impl fmt::Display for Walltime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.as_secs();
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;
        write!(f, "{hours:02}:{minutes:02}:{seconds:02}")
    }
}

impl FromStr for Walltime {
    type Err = WalltimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [hours, minutes, seconds] = parts.as_slice() else {
            return Err(WalltimeError::Format(s.to_string()));
        };
        let parse = |part: &str| -> Result<u64, WalltimeError> {
            if part.len() < 2 || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(WalltimeError::Format(s.to_string()));
            }
            part.parse().map_err(|_| WalltimeError::Format(s.to_string()))
        };
        let secs = parse(hours)? * 3600 + parse(minutes)? * 60 + parse(seconds)?;
        Self::from_duration(Duration::from_secs(secs))
    }
}

impl TryFrom<String> for Walltime {
    type Error = WalltimeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Walltime> for String {
    fn from(w: Walltime) -> Self {
        w.to_string()
    }
}

#[cfg(test)]
#[path = "walltime_tests.rs"]
mod tests;
