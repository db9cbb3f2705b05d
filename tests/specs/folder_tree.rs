//! Hierarchical namespace: recursive removal cleans rows and artifacts.

use crate::prelude::*;
use kong_drivers::JobSpec;
use kong_session::always_confirm;

#[tokio::test]
async fn recursive_rm_erases_tree_rows_and_directories() {
    let env = env();
    let mut session = session(&env);
    session.mkdir("a/b/c", false, true).unwrap();

    let mut artifact_dirs = Vec::new();
    for path in ["a", "a/b", "a/b/c"] {
        session.cd("").unwrap();
        session.cd(path).unwrap();
        for i in 0..3 {
            let job = session
                .create_job(JobSpec::new(format!("echo {path}-{i}")))
                .await
                .unwrap();
            artifact_dirs.push(job.log_dir().unwrap());
            artifact_dirs.push(job.output_dir().unwrap());
        }
    }
    session.cd("").unwrap();
    assert_eq!(env.store.count_jobs().unwrap(), 9);

    let confirmed = session.rm("/a", true, always_confirm).await.unwrap();
    assert!(confirmed);

    assert!(env.store.find_by_path(session.cwd(), "/a").unwrap().is_none());
    assert!(env.store.find_by_path(session.cwd(), "/a/b").unwrap().is_none());
    assert_eq!(env.store.count_jobs().unwrap(), 0);
    for dir in artifact_dirs {
        assert!(!dir.exists(), "{} should have been removed", dir.display());
    }
}

#[tokio::test]
async fn sibling_trees_survive_recursive_rm() {
    let env = env();
    let mut session = session(&env);
    session.mkdir("doomed", false, false).unwrap();
    session.mkdir("kept", false, false).unwrap();

    session.cd("kept").unwrap();
    let survivor = session.create_job(JobSpec::new("echo keep")).await.unwrap();
    session.cd("").unwrap();

    session.rm("doomed", true, always_confirm).await.unwrap();

    assert!(env.store.find_by_path(session.cwd(), "kept").unwrap().is_some());
    assert!(env.store.job(survivor.job_id).unwrap().is_some());
}
