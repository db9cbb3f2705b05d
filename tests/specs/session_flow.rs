//! Session-level dispatch over a scheduler back-end: selectors resolve,
//! groups route to the owning driver, reconciliation flows back into `ls`.

use crate::prelude::*;
use kong_core::{DriverKind, JobStatus};
use kong_drivers::{Driver, FakeSlurmClient, JobSpec, SlurmDriver};
use kong_session::always_confirm;
use std::sync::Arc;

#[tokio::test]
async fn scheduler_jobs_flow_through_the_session() {
    let env = env();
    let mut session = session(&env);
    let client = Arc::new(FakeSlurmClient::new());
    let slurm = SlurmDriver::with_client(&env.config, &env.store, client.clone()).unwrap();
    session.inject_driver(DriverKind::Slurm, Arc::new(slurm));

    session.mkdir("prod", false, false).unwrap();
    session.cd("prod").unwrap();
    let slurm_driver = session.driver(DriverKind::Slurm).unwrap();
    for i in 0..4 {
        slurm_driver
            .create_job(session.cwd(), JobSpec::new(format!("./prod.sh {i}")))
            .await
            .unwrap();
    }
    session.cd("").unwrap();

    session
        .submit_job("prod/*", false, always_confirm)
        .await
        .unwrap();
    let jobs = session.get_jobs("prod/*", false).unwrap();
    assert!(jobs.iter().all(|j| j.status == JobStatus::Submitted));

    // The scheduler finishes half the jobs; a refreshed listing shows it.
    let ids: Vec<String> = jobs
        .iter()
        .map(|j| j.batch_job_id.clone().unwrap())
        .collect();
    client.push_sacct(
        ids.iter()
            .enumerate()
            .map(|(i, id)| {
                if i % 2 == 0 {
                    (id.clone(), "COMPLETED", 0)
                } else {
                    (id.clone(), "RUNNING", 0)
                }
            })
            .collect(),
    );

    let (_, listed) = session.ls("prod", true, false).await.unwrap();
    let statuses: Vec<JobStatus> = listed.iter().map(|j| j.status).collect();
    assert_eq!(
        statuses,
        vec![
            JobStatus::Completed,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Running,
        ]
    );

    // Killing the remainder cancels at the scheduler.
    client.push_sacct(
        ids.iter()
            .enumerate()
            .map(|(i, id)| {
                if i % 2 == 0 {
                    (id.clone(), "COMPLETED", 0)
                } else {
                    (id.clone(), "RUNNING", 0)
                }
            })
            .collect(),
    );
    session
        .kill_job("prod/*", false, always_confirm)
        .await
        .unwrap();
    assert_eq!(client.cancelled.lock().len(), 2);

    let counts = session.status("prod").unwrap();
    assert_eq!(counts[&JobStatus::Completed], 2);
    assert_eq!(counts[&JobStatus::Failed], 2);
}

#[tokio::test]
async fn mixed_driver_selection_dispatches_per_group() {
    let env = env();
    let session = session(&env);
    let client = Arc::new(FakeSlurmClient::new());
    let slurm = SlurmDriver::with_client(&env.config, &env.store, client.clone()).unwrap();
    session.inject_driver(DriverKind::Slurm, Arc::new(slurm));

    // One local job, one scheduler job, side by side in the same folder.
    session.create_job(JobSpec::new("echo local")).await.unwrap();
    session
        .driver(DriverKind::Slurm)
        .unwrap()
        .create_job(session.cwd(), JobSpec::new("echo slurm"))
        .await
        .unwrap();

    session.submit_job("*", false, always_confirm).await.unwrap();

    let jobs = session.get_jobs("*", false).unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Submitted));
    let kinds: Vec<DriverKind> = jobs.iter().map(|j| j.driver).collect();
    assert!(kinds.contains(&DriverKind::Local));
    assert!(kinds.contains(&DriverKind::Slurm));
}
