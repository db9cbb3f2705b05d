//! Local driver end-to-end: real child processes, captured output.

use crate::prelude::*;
use kong_core::JobStatus;
use kong_drivers::{Driver, JobSpec};
use kong_session::always_confirm;

#[tokio::test]
async fn single_echo_job_completes_with_output() {
    let env = env();
    let session = session(&env);

    let job = session.create_job(JobSpec::new("echo HELLO")).await.unwrap();
    session
        .submit_job(&job.job_id.to_string(), false, always_confirm)
        .await
        .unwrap();

    let jobs = session
        .wait(&job.job_id.to_string(), false, quick_wait(), None)
        .await
        .unwrap();
    let mut job = jobs.into_iter().next().unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.data.exit_code(), Some(0));

    let driver = session.driver(job.driver).unwrap();
    let stdout = driver.stdout(&mut job).await.unwrap().read_all().unwrap();
    assert_eq!(stdout, "HELLO\n");
}

#[tokio::test]
async fn thirty_job_wave_reports_individual_outcomes() {
    let env = env();
    let session = session(&env);

    for i in 1..=15 {
        session
            .create_job(JobSpec::new(format!("sleep 0.1 ; echo JOB{i}")))
            .await
            .unwrap();
    }
    for i in 16..=30 {
        session
            .create_job(JobSpec::new(format!("sleep 0.1 ; echo JOB{i} 1>&2 ; exit 1")))
            .await
            .unwrap();
    }

    session.submit_job("*", false, always_confirm).await.unwrap();
    let jobs = session.wait("*", false, quick_wait(), None).await.unwrap();
    assert_eq!(jobs.len(), 30);

    let driver = session.driver(jobs[0].driver).unwrap();
    for (i, mut job) in jobs.into_iter().enumerate() {
        let n = i + 1;
        if n <= 15 {
            assert_eq!(job.status, JobStatus::Completed, "job {n}");
            assert_eq!(job.data.exit_code(), Some(0), "job {n}");
            let stdout = driver.stdout(&mut job).await.unwrap().read_all().unwrap();
            assert_eq!(stdout, format!("JOB{n}\n"));
        } else {
            assert_eq!(job.status, JobStatus::Failed, "job {n}");
            assert_eq!(job.data.exit_code(), Some(1), "job {n}");
            let stderr = driver.stderr(&mut job).await.unwrap().read_all().unwrap();
            assert_eq!(stderr, format!("JOB{n}\n"));
        }
    }
}

#[tokio::test]
async fn jobs_see_the_kong_environment() {
    let env = env();
    let session = session(&env);

    let job = session
        .create_job(JobSpec::new(
            "echo $KONG_JOB_ID ; test -n \"$KONG_JOB_OUTPUT_DIR\" ; \
             test -n \"$KONG_JOB_LOG_DIR\" ; test -n \"$KONG_JOB_SCRATCHDIR\" ; \
             echo nproc=$KONG_JOB_NPROC",
        ))
        .await
        .unwrap();
    session.submit_job("*", false, always_confirm).await.unwrap();
    let jobs = session.wait("*", false, quick_wait(), None).await.unwrap();
    let mut done = jobs.into_iter().next().unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    let driver = session.driver(done.driver).unwrap();
    let stdout = driver.stdout(&mut done).await.unwrap().read_all().unwrap();
    assert_eq!(stdout, format!("{}\nnproc=1\n", job.job_id));
}
