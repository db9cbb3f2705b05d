//! Slurm driver against a scripted scheduler: reconciliation rounds.

use crate::prelude::*;
use kong_core::JobStatus;
use kong_drivers::{Driver, FakeSlurmClient, JobSpec, SlurmDriver};
use std::sync::Arc;

#[tokio::test]
async fn fifteen_jobs_through_two_accounting_rounds() {
    let env = env();
    let client = Arc::new(FakeSlurmClient::new());
    let driver = SlurmDriver::with_client(&env.config, &env.store, client.clone()).unwrap();

    let specs = (0..15)
        .map(|i| JobSpec::new(format!("./analyse --shard {i}")))
        .collect();
    let jobs = driver.bulk_create_jobs(&env.root, specs).await.unwrap();
    let jobs = driver.bulk_submit(jobs).await.unwrap();
    let ids: Vec<String> = jobs
        .iter()
        .map(|j| j.batch_job_id.clone().unwrap())
        .collect();

    // First sacct round: everything reported running.
    client.push_sacct(ids.iter().map(|id| (id.clone(), "RUNNING", 0)).collect());
    let jobs = driver.bulk_sync_status(jobs).await.unwrap();
    assert_eq!(jobs.len(), 15);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Running));

    // Second round: six complete with exit 0, the rest fail with exit 1. An
    // id the database has never seen rides along and must be ignored.
    let mut second: Vec<(String, &str, i64)> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            if i < 6 {
                (id.clone(), "COMPLETED", 0)
            } else {
                (id.clone(), "FAILED", 1)
            }
        })
        .collect();
    second.push(("999999".to_string(), "RUNNING", 0));
    client.push_sacct(second);

    let rows_before = env.store.count_jobs().unwrap();
    let jobs = driver.bulk_sync_status(jobs).await.unwrap();
    assert_eq!(env.store.count_jobs().unwrap(), rows_before);

    for (i, job) in jobs.iter().enumerate() {
        if i < 6 {
            assert_eq!(job.status, JobStatus::Completed, "job {i}");
            assert_eq!(job.data.exit_code(), Some(0));
        } else {
            assert_eq!(job.status, JobStatus::Failed, "job {i}");
            assert_eq!(job.data.exit_code(), Some(1));
        }
    }
}

#[tokio::test]
async fn cancelled_by_uid_counts_as_failed() {
    let env = env();
    let client = Arc::new(FakeSlurmClient::new());
    let driver = SlurmDriver::with_client(&env.config, &env.store, client.clone()).unwrap();

    let jobs = driver
        .bulk_create_jobs(&env.root, vec![JobSpec::new("./job.sh")])
        .await
        .unwrap();
    let jobs = driver.bulk_submit(jobs).await.unwrap();
    let id = jobs[0].batch_job_id.clone().unwrap();

    client.push_sacct(vec![(id, "CANCELLED by 4221", 0)]);
    let jobs = driver.bulk_sync_status(jobs).await.unwrap();
    assert_eq!(jobs[0].status, JobStatus::Failed);
}
