// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for driver tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use kong_core::{Config, Folder};
use kong_storage::Store;

/// A config, store and root folder rooted in a fresh temp dir. Dropping the
/// env removes everything.
pub struct TestEnv {
    pub dir: tempfile::TempDir,
    pub config: Config,
    pub store: Store,
    pub root: Folder,
}

/// Build a test environment with all driver sections configured.
pub fn env() -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.yml"),
        concat!(
            "default_driver: kong.driver.local\n",
            "slurm_driver:\n",
            "  account: atlas\n",
            "  node_size: 8\n",
            "  default_queue: short\n",
            "htcondor_driver:\n",
            "  default_universe: vanilla\n",
            "  submitfile_extra: \"\"\n",
            "prun_driver:\n",
            "  PANDA_PYTHONPATH: /opt/panda\n",
            "  PATHENA_GRID_SETUP_SH: /opt/setup.sh\n",
            "  emi_path: /opt/emi\n",
        ),
    )
    .unwrap();
    let config = Config::load(dir.path()).unwrap();
    let store = Store::open_in_memory().unwrap();
    let root = store.root().unwrap();
    TestEnv {
        dir,
        config,
        store,
        root,
    }
}
