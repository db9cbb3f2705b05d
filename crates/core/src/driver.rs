// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driver tags.
//!
//! Every job row carries the fully-qualified tag of the driver that owns it.
//! The set of drivers is sealed: tags resolve through a single match, no
//! reflective loading.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error for an unrecognized driver tag.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown driver tag: {0}")]
pub struct UnknownDriverTag(pub String);

/// The back-end family a job is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// Child processes of the current host.
    Local,
    /// Slurm via sbatch/sacct/scancel.
    Slurm,
    /// HTCondor via condor_submit/condor_q/condor_history/condor_rm.
    HtCondor,
    /// The Panda grid system (query-only surface).
    Panda,
}

impl DriverKind {
    /// Fully-qualified tag stored in the `driver` column.
    pub fn tag(&self) -> &'static str {
        match self {
            DriverKind::Local => "kong.driver.local",
            DriverKind::Slurm => "kong.driver.slurm",
            DriverKind::HtCondor => "kong.driver.htcondor",
            DriverKind::Panda => "kong.driver.panda",
        }
    }

    /// Short human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            DriverKind::Local => "local",
            DriverKind::Slurm => "slurm",
            DriverKind::HtCondor => "htcondor",
            DriverKind::Panda => "panda",
        }
    }
}

impl FromStr for DriverKind {
    type Err = UnknownDriverTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kong.driver.local" => Ok(DriverKind::Local),
            "kong.driver.slurm" => Ok(DriverKind::Slurm),
            "kong.driver.htcondor" => Ok(DriverKind::HtCondor),
            "kong.driver.panda" => Ok(DriverKind::Panda),
            other => Err(UnknownDriverTag(other.to_string())),
        }
    }
}

impl fmt::Display for DriverKind {
    // Prints the fully-qualified tag so log lines can be pasted straight
    // back into the config file.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
