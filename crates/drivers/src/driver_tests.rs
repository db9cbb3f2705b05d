// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support;
use kong_core::JobStatus;

#[test]
fn job_spec_defaults() {
    let spec = JobSpec::new("echo hi");
    assert_eq!(spec.command, "echo hi");
    assert_eq!(spec.cores, 1);
    assert_eq!(spec.memory, 1000);
    assert_eq!(spec.nnodes, 1);
    assert_eq!(spec.ntasks, 1);
    assert_eq!(spec.walltime.to_string(), "00:30:00");
    assert!(spec.name.is_none());
    assert!(spec.queue.is_none());
}

#[test]
fn job_spec_builder_chains() {
    let spec = JobSpec::new("run").cores(4).memory(8000).name("fit-7");
    assert_eq!(spec.cores, 4);
    assert_eq!(spec.memory, 8000);
    assert_eq!(spec.name.as_deref(), Some("fit-7"));
}

#[test]
fn wait_options_default_to_thirty_second_polling() {
    let opts = WaitOptions::default();
    assert_eq!(opts.poll_interval, Duration::from_secs(30));
    assert!(opts.timeout.is_none());
}

#[test]
fn check_driver_rejects_foreign_jobs() {
    let env = test_support::env();
    let mut job = env
        .store
        .insert_job(kong_storage::NewJob {
            batch_job_id: None,
            driver: DriverKind::Slurm,
            folder_id: env.root.folder_id,
            command: "echo".into(),
            cores: 1,
            memory: 1000,
        })
        .unwrap();

    assert!(check_driver(DriverKind::Slurm, &job).is_ok());
    let err = check_driver(DriverKind::Local, &job).unwrap_err();
    assert!(matches!(
        err,
        DriverError::Mismatch {
            actual: DriverKind::Slurm,
            expected: DriverKind::Local,
            ..
        }
    ));

    job.status = JobStatus::Completed;
    // the guard is independent of status
    assert!(check_driver(DriverKind::Slurm, &job).is_ok());
}

#[test]
fn output_handle_reads_and_releases() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stdout.txt");
    std::fs::write(&path, "HELLO\n").unwrap();

    let handle = OutputHandle::open(path.clone()).unwrap();
    assert_eq!(handle.path(), path.as_path());
    assert_eq!(handle.read_all().unwrap(), "HELLO\n");

    // handle is consumed/dropped; the file can be removed afterwards
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn output_handle_missing_file_is_io_error() {
    assert!(OutputHandle::open("/nonexistent/stdout.txt".into()).is_err());
}
