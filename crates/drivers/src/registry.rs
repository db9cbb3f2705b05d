// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driver registry.
//!
//! Drivers are registered at program start through one match over the sealed
//! [`DriverKind`]; there is no reflective loading. Production construction
//! wires in the shell-backed clients; tests build drivers directly with fake
//! clients instead.

use crate::driver::{Driver, DriverError};
use crate::htcondor::{HtCondorDriver, ShellCondorClient};
use crate::local::LocalDriver;
use crate::panda::{HttpPandaClient, PandaDriver};
use crate::slurm::{ShellSlurmClient, SlurmDriver};
use kong_core::{Config, DriverKind};
use kong_storage::Store;
use std::sync::Arc;

/// Build the driver for `kind`, wired to the real back-end tools.
pub fn build(
    kind: DriverKind,
    config: &Config,
    store: &Store,
) -> Result<Arc<dyn Driver>, DriverError> {
    tracing::debug!(driver = %kind, "constructing driver");
    let driver: Arc<dyn Driver> = match kind {
        DriverKind::Local => Arc::new(LocalDriver::new(config.clone(), store.clone())?),
        DriverKind::Slurm => Arc::new(SlurmDriver::with_client(
            config,
            store,
            Arc::new(ShellSlurmClient),
        )?),
        DriverKind::HtCondor => Arc::new(HtCondorDriver::with_client(
            config,
            store,
            Arc::new(ShellCondorClient),
        )?),
        DriverKind::Panda => Arc::new(PandaDriver::new(
            config.clone(),
            store.clone(),
            Arc::new(HttpPandaClient::new()),
        )?),
    };
    Ok(driver)
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
