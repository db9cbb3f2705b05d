// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::env;

#[test]
fn builds_every_registered_driver() {
    let env = env();
    for kind in [
        DriverKind::Local,
        DriverKind::Slurm,
        DriverKind::HtCondor,
        DriverKind::Panda,
    ] {
        let driver = build(kind, &env.config, &env.store).unwrap();
        assert_eq!(driver.kind(), kind);
    }
}

#[test]
fn driver_sections_are_required() {
    let env = env();
    let mut config = env.config.clone();
    config.slurm_driver = None;
    assert!(build(DriverKind::Slurm, &config, &env.store).is_err());
    assert!(build(DriverKind::Local, &config, &env.store).is_ok());
}
