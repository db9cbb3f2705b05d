// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kong-drivers: back-end drivers for the kong job orchestrator
//!
//! A driver maps the orchestration primitives (create, submit, sync, kill,
//! wait, resubmit, cleanup, remove) onto one concrete back-end. The local
//! driver forks jobs on the current host; the batch drivers translate the
//! same surface into scheduler submissions and accounting queries behind
//! injectable client traits so tests can stub the scheduler.

pub mod batch;
pub mod driver;
pub mod executor;
pub mod htcondor;
pub mod layout;
pub mod local;
pub mod panda;
pub mod registry;
pub mod slurm;
pub mod subprocess;
mod wait;

pub use batch::{AccountingItem, BatchBackend, BatchDriver};
pub use driver::{
    CleanupProgress, Driver, DriverError, JobSpec, OutputHandle, WaitOptions, WaitProgress,
};
pub use executor::{Executor, ExecutorError, CLEANUP_WORKERS};
pub use htcondor::{CondorClient, HtCondorDriver, ShellCondorClient};
pub use local::LocalDriver;
pub use panda::{HttpPandaClient, PandaClient, PandaDriver};
pub use registry::build;
pub use slurm::{ShellSlurmClient, SlurmClient, SlurmDriver};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

#[cfg(any(test, feature = "test-support"))]
pub use htcondor::FakeCondorClient;
#[cfg(any(test, feature = "test-support"))]
pub use panda::FakePandaClient;
#[cfg(any(test, feature = "test-support"))]
pub use slurm::FakeSlurmClient;
