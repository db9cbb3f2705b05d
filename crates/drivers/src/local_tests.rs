// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{env, TestEnv};

fn driver(env: &TestEnv) -> LocalDriver {
    LocalDriver::new(env.config.clone(), env.store.clone()).unwrap()
}

fn quick_wait() -> WaitOptions {
    WaitOptions::default()
        .poll_interval(Duration::from_millis(50))
        .timeout(Duration::from_secs(30))
}

#[tokio::test]
async fn create_job_materializes_scripts_and_directories() {
    let env = env();
    let driver = driver(&env);
    let job = driver
        .create_job(&env.root, JobSpec::new("echo HELLO"))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Created);
    assert_eq!(job.driver, DriverKind::Local);
    assert!(job.batch_job_id.is_some(), "local allocates the id upfront");

    let log_dir = job.log_dir().unwrap();
    assert!(log_dir.is_dir());
    assert!(job.output_dir().unwrap().is_dir());
    assert!(job.data.path("scratch_dir").unwrap().is_dir());

    let script = std::fs::read_to_string(job.data.path("jobscript").unwrap()).unwrap();
    assert!(script.contains("export KONG_JOB_ID="));
    assert!(script.contains("export KONG_JOB_OUTPUT_DIR="));
    assert!(script.contains("export KONG_JOB_LOG_DIR="));
    assert!(script.contains("export KONG_JOB_NPROC=1"));
    assert!(script.contains("export KONG_JOB_SCRATCHDIR="));
    assert!(script.contains("(echo HELLO)"));
    // sharded layout: jobdir/aa/bb/00000x
    assert!(log_dir.starts_with(&env.config.jobdir));
    assert_eq!(log_dir.components().count(), env.config.jobdir.components().count() + 3);
}

#[tokio::test]
async fn empty_command_is_rejected() {
    let env = env();
    let driver = driver(&env);
    assert!(matches!(
        driver.create_job(&env.root, JobSpec::new("")).await,
        Err(DriverError::InvalidSpec(_))
    ));
}

#[tokio::test]
async fn echo_job_completes_with_captured_stdout() {
    let env = env();
    let driver = driver(&env);
    let mut job = driver
        .create_job(&env.root, JobSpec::new("echo HELLO"))
        .await
        .unwrap();

    driver.submit(&mut job).await.unwrap();
    assert_eq!(job.status, JobStatus::Submitted);

    let jobs = driver.wait(vec![job], quick_wait(), None).await.unwrap();
    let mut job = jobs.into_iter().next().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.data.exit_code(), Some(0));

    let stdout = driver.stdout(&mut job).await.unwrap().read_all().unwrap();
    assert_eq!(stdout, "HELLO\n");
}

#[tokio::test]
async fn failing_job_captures_stderr_and_exit_code() {
    let env = env();
    let driver = driver(&env);
    let mut job = driver
        .create_job(&env.root, JobSpec::new("echo OOPS 1>&2; exit 1"))
        .await
        .unwrap();

    driver.submit(&mut job).await.unwrap();
    let jobs = driver.wait(vec![job], quick_wait(), None).await.unwrap();
    let mut job = jobs.into_iter().next().unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.data.exit_code(), Some(1));
    let stderr = driver.stderr(&mut job).await.unwrap().read_all().unwrap();
    assert_eq!(stderr, "OOPS\n");
}

#[tokio::test]
async fn submit_is_guarded_by_status() {
    let env = env();
    let driver = driver(&env);
    let mut job = driver
        .create_job(&env.root, JobSpec::new("sleep 0.1"))
        .await
        .unwrap();
    driver.submit(&mut job).await.unwrap();

    let err = driver.submit(&mut job).await.unwrap_err();
    assert!(matches!(err, DriverError::InvalidStatus(_)));
}

#[tokio::test]
async fn stdout_requires_a_finished_job() {
    let env = env();
    let driver = driver(&env);
    let mut job = driver
        .create_job(&env.root, JobSpec::new("echo HI"))
        .await
        .unwrap();
    assert!(matches!(
        driver.stdout(&mut job).await,
        Err(DriverError::InvalidStatus(_))
    ));
}

#[tokio::test]
async fn kill_running_job_marks_failed() {
    let env = env();
    let driver = driver(&env);
    let mut job = driver
        .create_job(&env.root, JobSpec::new("sleep 30"))
        .await
        .unwrap();
    driver.submit(&mut job).await.unwrap();

    driver.kill(&mut job).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);

    // killing again is a no-op
    driver.kill(&mut job).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn kill_created_job_needs_no_process() {
    let env = env();
    let driver = driver(&env);
    let mut job = driver
        .create_job(&env.root, JobSpec::new("echo HI"))
        .await
        .unwrap();
    driver.kill(&mut job).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

#[tokio::test]
async fn wait_rejects_created_jobs() {
    let env = env();
    let driver = driver(&env);
    let job = driver
        .create_job(&env.root, JobSpec::new("echo HI"))
        .await
        .unwrap();
    assert!(matches!(
        driver.wait(vec![job], quick_wait(), None).await,
        Err(DriverError::InvalidStatus(_))
    ));
}

#[tokio::test]
async fn wait_times_out_on_long_job() {
    let env = env();
    let driver = driver(&env);
    let mut job = driver
        .create_job(&env.root, JobSpec::new("sleep 30"))
        .await
        .unwrap();
    driver.submit(&mut job).await.unwrap();

    let opts = WaitOptions::default()
        .poll_interval(Duration::from_millis(20))
        .timeout(Duration::from_millis(200));
    let err = driver.wait(vec![job.clone()], opts, None).await.unwrap_err();
    assert!(matches!(err, DriverError::Timeout(_)));

    driver.kill(&mut job).await.unwrap();
}

#[tokio::test]
async fn sync_status_leaves_created_jobs_alone() {
    let env = env();
    let driver = driver(&env);
    let mut job = driver
        .create_job(&env.root, JobSpec::new("echo HI"))
        .await
        .unwrap();
    driver.sync_status(&mut job).await.unwrap();
    assert_eq!(job.status, JobStatus::Created);
}

#[tokio::test]
async fn mismatched_driver_is_rejected() {
    let env = env();
    let driver = driver(&env);
    let mut job = driver
        .create_job(&env.root, JobSpec::new("echo HI"))
        .await
        .unwrap();
    job.driver = DriverKind::Slurm;
    assert!(matches!(
        driver.sync_status(&mut job).await,
        Err(DriverError::Mismatch { .. })
    ));
}

#[tokio::test]
async fn bulk_lifecycle_mixed_success_and_failure() {
    let env = env();
    let driver = driver(&env);
    let mut specs = Vec::new();
    for i in 1..=3 {
        specs.push(JobSpec::new(format!("sleep 0.1 ; echo JOB{i}")));
    }
    for i in 4..=6 {
        specs.push(JobSpec::new(format!("sleep 0.1 ; echo JOB{i} 1>&2 ; exit 1")));
    }
    let jobs = driver.bulk_create_jobs(&env.root, specs).await.unwrap();
    assert_eq!(jobs.len(), 6);

    let jobs = driver.bulk_submit(jobs).await.unwrap();
    assert!(jobs.iter().all(|j| j.status == JobStatus::Submitted));

    let jobs = driver.wait(jobs, quick_wait(), None).await.unwrap();
    for (i, mut job) in jobs.into_iter().enumerate() {
        let n = i + 1;
        if n <= 3 {
            assert_eq!(job.status, JobStatus::Completed, "job {n}");
            let stdout = driver.stdout(&mut job).await.unwrap().read_all().unwrap();
            assert_eq!(stdout, format!("JOB{n}\n"));
        } else {
            assert_eq!(job.status, JobStatus::Failed, "job {n}");
            let stderr = driver.stderr(&mut job).await.unwrap().read_all().unwrap();
            assert_eq!(stderr, format!("JOB{n}\n"));
        }
    }
}

#[tokio::test]
async fn cleanup_is_idempotent_and_guarded() {
    let env = env();
    let driver = driver(&env);
    let mut job = driver
        .create_job(&env.root, JobSpec::new("sleep 30"))
        .await
        .unwrap();
    driver.submit(&mut job).await.unwrap();

    assert!(matches!(
        driver.cleanup(&mut job).await,
        Err(DriverError::InvalidStatus(_))
    ));

    driver.kill(&mut job).await.unwrap();
    driver.cleanup(&mut job).await.unwrap();
    assert!(!job.log_dir().unwrap().exists());
    assert!(!job.output_dir().unwrap().exists());

    // second cleanup sees nothing left and succeeds
    driver.cleanup(&mut job).await.unwrap();
}

#[tokio::test]
async fn remove_deletes_row_and_directories() {
    let env = env();
    let driver = driver(&env);
    let job = driver
        .create_job(&env.root, JobSpec::new("echo HI"))
        .await
        .unwrap();
    let id = job.job_id;
    let log_dir = job.log_dir().unwrap();

    driver.remove(job).await.unwrap();

    assert!(env.store.job(id).unwrap().is_none());
    assert!(!log_dir.exists());
}

#[tokio::test]
async fn resubmit_clears_artifacts_and_resubmits() {
    let env = env();
    let driver = driver(&env);
    let mut job = driver
        .create_job(&env.root, JobSpec::new("echo ROUND"))
        .await
        .unwrap();
    driver.submit(&mut job).await.unwrap();
    let jobs = driver.wait(vec![job], quick_wait(), None).await.unwrap();
    let mut job = jobs.into_iter().next().unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    driver.resubmit(&mut job).await.unwrap();
    assert_eq!(job.status, JobStatus::Submitted);

    let jobs = driver.wait(vec![job], quick_wait(), None).await.unwrap();
    let mut job = jobs.into_iter().next().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    let stdout = driver.stdout(&mut job).await.unwrap().read_all().unwrap();
    assert_eq!(stdout, "ROUND\n", "old output must not accumulate");
}

#[tokio::test]
async fn resubmit_rejects_live_jobs() {
    let env = env();
    let driver = driver(&env);
    let mut job = driver
        .create_job(&env.root, JobSpec::new("sleep 30"))
        .await
        .unwrap();
    driver.submit(&mut job).await.unwrap();

    assert!(matches!(
        driver.resubmit(&mut job).await,
        Err(DriverError::InvalidStatus(_))
    ));
    driver.kill(&mut job).await.unwrap();
}

#[tokio::test]
async fn bulk_resubmit_only_touches_the_given_set() {
    let env = env();
    let driver = driver(&env);
    let jobs = driver
        .bulk_create_jobs(
            &env.root,
            (0..4).map(|i| JobSpec::new(format!("echo R{i}"))).collect(),
        )
        .await
        .unwrap();
    let jobs = driver.bulk_submit(jobs).await.unwrap();
    let jobs = driver.wait(jobs, quick_wait(), None).await.unwrap();
    assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));

    let (resubmit, keep) = jobs.split_at(3);
    let resubmitted = driver
        .bulk_resubmit(resubmit.to_vec(), true)
        .await
        .unwrap();
    assert_eq!(resubmitted.len(), 3);
    assert!(resubmitted.iter().all(|j| j.status == JobStatus::Submitted));

    // the fourth job is untouched
    let outside = env.store.job(keep[0].job_id).unwrap().unwrap();
    assert_eq!(outside.status, JobStatus::Completed);

    let done = driver.wait(resubmitted, quick_wait(), None).await.unwrap();
    assert!(done.iter().all(|j| j.status == JobStatus::Completed));
}

#[tokio::test]
async fn bulk_cleanup_reports_progress_per_job() {
    let env = env();
    let driver = driver(&env);
    let jobs = driver
        .bulk_create_jobs(
            &env.root,
            (0..3).map(|i| JobSpec::new(format!("echo C{i}"))).collect(),
        )
        .await
        .unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let cleaned = driver
        .bulk_cleanup(jobs, Executor::Serial, Some(tx))
        .await
        .unwrap();
    assert_eq!(cleaned.len(), 3);

    let mut reported = 0;
    while rx.try_recv().is_ok() {
        reported += 1;
    }
    assert_eq!(reported, 3);
    for job in &cleaned {
        assert!(!job.log_dir().unwrap().exists());
    }
}
