// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn store() -> Store {
    Store::open_in_memory().unwrap()
}

fn new_job(folder: FolderId) -> crate::NewJob {
    crate::NewJob {
        batch_job_id: None,
        driver: kong_core::DriverKind::Local,
        folder_id: folder,
        command: "sleep 1".to_string(),
        cores: 1,
        memory: 1000,
    }
}

#[test]
fn root_is_created_once() {
    let store = store();
    let a = store.root().unwrap();
    let b = store.root().unwrap();
    assert_eq!(a.folder_id, b.folder_id);
    assert_eq!(a.name, ROOT_NAME);
    assert!(a.is_root());
}

#[test]
fn create_and_look_up_subfolder() {
    let store = store();
    let root = store.root().unwrap();
    let folder = store.create_folder(root.folder_id, "alpha").unwrap();
    assert_eq!(folder.parent, Some(root.folder_id));

    let found = store.subfolder(root.folder_id, "alpha").unwrap().unwrap();
    assert_eq!(found.folder_id, folder.folder_id);
    assert!(store.subfolder(root.folder_id, "beta").unwrap().is_none());
}

#[test]
fn duplicate_sibling_name_is_rejected() {
    let store = store();
    let root = store.root().unwrap();
    store.create_folder(root.folder_id, "alpha").unwrap();
    assert!(matches!(
        store.create_folder(root.folder_id, "alpha"),
        Err(StorageError::Sqlite(_))
    ));
}

#[test]
fn invalid_names_are_rejected_before_touching_the_db() {
    let store = store();
    let root = store.root().unwrap();
    for name in ["", ".", "..", "a/b", "42"] {
        assert!(matches!(
            store.create_folder(root.folder_id, name),
            Err(StorageError::InvalidName(_))
        ));
    }
    assert!(store.children(root.folder_id).unwrap().is_empty());
}

#[test]
fn folder_path_concatenates_ancestors() {
    let store = store();
    let root = store.root().unwrap();
    let a = store.create_folder(root.folder_id, "a").unwrap();
    let b = store.create_folder(a.folder_id, "b").unwrap();
    let c = store.create_folder(b.folder_id, "c").unwrap();

    assert_eq!(store.folder_path(&root).unwrap(), "/");
    assert_eq!(store.folder_path(&a).unwrap(), "/a");
    assert_eq!(store.folder_path(&c).unwrap(), "/a/b/c");
}

#[test]
fn find_by_path_resolves_absolute_relative_and_dots() {
    let store = store();
    let root = store.root().unwrap();
    let a = store.create_folder(root.folder_id, "a").unwrap();
    let b = store.create_folder(a.folder_id, "b").unwrap();

    let find = |cwd: &Folder, path: &str| store.find_by_path(cwd, path).unwrap();

    assert_eq!(find(&root, "/").unwrap().folder_id, root.folder_id);
    assert_eq!(find(&root, "a/b").unwrap().folder_id, b.folder_id);
    assert_eq!(find(&b, "/a").unwrap().folder_id, a.folder_id);
    assert_eq!(find(&b, "..").unwrap().folder_id, a.folder_id);
    assert_eq!(find(&b, "../..").unwrap().folder_id, root.folder_id);
    assert_eq!(find(&a, ".").unwrap().folder_id, a.folder_id);
    assert_eq!(find(&a, "b/").unwrap().folder_id, b.folder_id);
    assert_eq!(find(&root, "").unwrap().folder_id, root.folder_id);

    assert!(find(&root, "missing").is_none());
    assert!(find(&root, "a/missing").is_none());
    assert!(find(&root, "..").is_none());
}

#[test]
fn update_folder_renames_and_reparents() {
    let store = store();
    let root = store.root().unwrap();
    let a = store.create_folder(root.folder_id, "a").unwrap();
    let b = store.create_folder(root.folder_id, "b").unwrap();

    let mut moved = a.clone();
    moved.name = "a2".to_string();
    moved.parent = Some(b.folder_id);
    let moved = store.update_folder(&moved).unwrap();
    assert_eq!(moved.name, "a2");
    assert_eq!(moved.parent, Some(b.folder_id));
    assert!(store.subfolder(root.folder_id, "a").unwrap().is_none());
}

#[test]
fn update_folder_rejects_self_parent() {
    let store = store();
    let root = store.root().unwrap();
    let a = store.create_folder(root.folder_id, "a").unwrap();
    let mut bad = a.clone();
    bad.parent = Some(a.folder_id);
    assert!(matches!(
        store.update_folder(&bad),
        Err(StorageError::OwnParent)
    ));
}

#[test]
fn move_folders_is_one_update_and_skips_dest() {
    let store = store();
    let root = store.root().unwrap();
    let a = store.create_folder(root.folder_id, "a").unwrap();
    let b = store.create_folder(root.folder_id, "b").unwrap();
    let dest = store.create_folder(root.folder_id, "dest").unwrap();

    store
        .move_folders(&[a.folder_id, b.folder_id, dest.folder_id], dest.folder_id)
        .unwrap();

    let names: Vec<String> = store
        .children(dest.folder_id)
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(names, vec!["a", "b"]);
    // dest stayed where it was
    assert_eq!(
        store.folder(dest.folder_id).unwrap().unwrap().parent,
        Some(root.folder_id)
    );
}

#[test]
fn recursive_descent_cte_and_walk_agree() {
    let store = store();
    let root = store.root().unwrap();
    let a = store.create_folder(root.folder_id, "a").unwrap();
    let b = store.create_folder(a.folder_id, "b").unwrap();
    let c = store.create_folder(b.folder_id, "c").unwrap();
    store.create_folder(root.folder_id, "other").unwrap();
    for folder in [a.folder_id, b.folder_id, c.folder_id] {
        store.insert_job(new_job(folder)).unwrap();
    }

    let via_cte: Vec<_> = store
        .folders_recursive_cte(a.folder_id)
        .unwrap()
        .into_iter()
        .map(|f| f.folder_id)
        .collect();
    let mut walked = Vec::new();
    store.folders_recursive_walk(a.folder_id, &mut walked).unwrap();
    let mut via_walk: Vec<_> = walked.into_iter().map(|f| f.folder_id).collect();
    via_walk.sort();
    assert_eq!(via_cte, via_walk);
    assert_eq!(via_cte, vec![b.folder_id, c.folder_id]);

    let jobs: Vec<_> = store
        .jobs_recursive(a.folder_id)
        .unwrap()
        .into_iter()
        .map(|j| j.folder_id)
        .collect();
    assert_eq!(jobs, vec![a.folder_id, b.folder_id, c.folder_id]);
}

#[test]
fn delete_folder_recursive_removes_descendants_and_jobs() {
    let store = store();
    let root = store.root().unwrap();
    let a = store.create_folder(root.folder_id, "a").unwrap();
    let b = store.create_folder(a.folder_id, "b").unwrap();
    store.insert_job(new_job(a.folder_id)).unwrap();
    store.insert_job(new_job(b.folder_id)).unwrap();
    let kept = store.create_folder(root.folder_id, "kept").unwrap();
    let kept_job = store.insert_job(new_job(kept.folder_id)).unwrap();

    store.delete_folder_recursive(a.folder_id).unwrap();

    assert!(store.folder(a.folder_id).unwrap().is_none());
    assert!(store.folder(b.folder_id).unwrap().is_none());
    assert_eq!(store.count_jobs().unwrap(), 1);
    assert!(store.job(kept_job.job_id).unwrap().is_some());
}

#[test]
fn job_stats_counts_recursively_with_zero_defaults() {
    let store = store();
    let root = store.root().unwrap();
    let a = store.create_folder(root.folder_id, "a").unwrap();
    let b = store.create_folder(a.folder_id, "b").unwrap();
    let job = store.insert_job(new_job(b.folder_id)).unwrap();
    store.insert_job(new_job(a.folder_id)).unwrap();

    let mut done = job.clone();
    done.status = JobStatus::Completed;
    store.update_job(&done).unwrap();

    let stats = store.job_stats(a.folder_id).unwrap();
    assert_eq!(stats[&JobStatus::Created], 1);
    assert_eq!(stats[&JobStatus::Completed], 1);
    assert_eq!(stats[&JobStatus::Running], 0);
    assert_eq!(stats.len(), JobStatus::ALL.len());
}
