//! HTCondor driver against a scripted scheduler: the history log decides
//! the fate of jobs that left the queue.

use crate::prelude::*;
use kong_core::JobStatus;
use kong_drivers::{Driver, FakeCondorClient, HtCondorDriver, JobSpec};
use std::sync::Arc;

#[tokio::test]
async fn completed_with_exit_one_is_failed() {
    let env = env();
    let client = Arc::new(FakeCondorClient::new());
    let driver = HtCondorDriver::with_client(&env.config, &env.store, client.clone()).unwrap();

    let mut job = driver
        .create_job(&env.root, JobSpec::new("./skim.sh"))
        .await
        .unwrap();
    driver.submit(&mut job).await.unwrap();
    let cluster: i64 = job.batch_job_id.clone().unwrap().parse().unwrap();

    // Scheduler says COMPLETED, payload exit code says otherwise.
    client.push_q(vec![]);
    client.push_history(vec![(cluster, 4, Some(1))]);

    driver.sync_status(&mut job).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.data.exit_code(), Some(1));
}

#[tokio::test]
async fn live_queue_and_history_cover_different_jobs() {
    let env = env();
    let client = Arc::new(FakeCondorClient::new());
    let driver = HtCondorDriver::with_client(&env.config, &env.store, client.clone()).unwrap();

    let jobs = driver
        .bulk_create_jobs(
            &env.root,
            vec![JobSpec::new("./a.sh"), JobSpec::new("./b.sh")],
        )
        .await
        .unwrap();
    let jobs = driver.bulk_submit(jobs).await.unwrap();
    let ids: Vec<i64> = jobs
        .iter()
        .map(|j| j.batch_job_id.clone().unwrap().parse().unwrap())
        .collect();

    client.push_q(vec![(ids[0], 2, None)]);
    client.push_history(vec![(ids[1], 4, Some(0))]);

    let jobs = driver.bulk_sync_status(jobs).await.unwrap();
    assert_eq!(jobs[0].status, JobStatus::Running);
    assert_eq!(jobs[1].status, JobStatus::Completed);
    assert_eq!(jobs[1].data.exit_code(), Some(0));
}
