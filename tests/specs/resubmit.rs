//! Bulk resubmission: artifacts are cleared, the untouched set stays put.

use crate::prelude::*;
use kong_core::JobStatus;
use kong_drivers::{Driver, JobSpec};
use kong_session::always_confirm;

#[tokio::test]
async fn bulk_resubmit_resets_three_and_spares_the_fourth() {
    let env = env();
    let session = session(&env);

    let mut ids = Vec::new();
    for i in 0..4 {
        let job = session
            .create_job(JobSpec::new(format!("echo ROUND-{i}")))
            .await
            .unwrap();
        ids.push(job.job_id);
    }
    session.submit_job("*", false, always_confirm).await.unwrap();
    let jobs = session.wait("*", false, quick_wait(), None).await.unwrap();
    assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));

    // Pre-existing artifacts from the first run.
    let stdout_paths: Vec<_> = jobs
        .iter()
        .take(3)
        .map(|j| j.data.path("stdout").unwrap())
        .collect();
    for path in &stdout_paths {
        assert!(path.exists());
    }

    let driver = session.driver(jobs[0].driver).unwrap();
    let resubmitted = driver
        .bulk_resubmit(jobs[..3].to_vec(), true)
        .await
        .unwrap();
    assert_eq!(resubmitted.len(), 3);
    assert!(resubmitted.iter().all(|j| j.status == JobStatus::Submitted));

    // The fourth completed job is untouched by the scoped reset.
    let fourth = env.store.job(ids[3]).unwrap().unwrap();
    assert_eq!(fourth.status, JobStatus::Completed);

    let done = driver.wait(resubmitted, quick_wait(), None).await.unwrap();
    for (i, mut job) in done.into_iter().enumerate() {
        assert_eq!(job.status, JobStatus::Completed);
        let stdout = driver.stdout(&mut job).await.unwrap().read_all().unwrap();
        assert_eq!(stdout, format!("ROUND-{i}\n"), "exactly one run's output");
    }
}
