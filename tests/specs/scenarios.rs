// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The end-to-end scenarios of the commit engine.

use super::helpers::*;
use gr_engine::{EngineError, WorkerCommand};

#[tokio::test]
async fn create_then_update_single_resource() {
    let tmp = tempfile::tempdir().unwrap();
    let (remote, url) = bare_remote(tmp.path());
    let (mut worker, _) = worker_on(tmp.path(), &url, "main").await;

    worker.handle(WorkerCommand::Deliver(create_pod("foo", "100"))).await.unwrap();
    worker.handle(WorkerCommand::Deliver(update_pod("foo", "101"))).await.unwrap();
    worker.push_cycle().await.unwrap();

    let messages = remote_messages(&remote, "main");
    assert_eq!(
        messages,
        vec![
            "[UPDATE] v1/pods/foo by user/alice".to_string(),
            "[CREATE] v1/pods/foo by user/alice".to_string(),
        ]
    );
    assert_eq!(
        remote_resource_version(&remote, "main", "v1/pods/default/foo.yaml").as_deref(),
        Some("101")
    );
}

#[tokio::test]
async fn stale_update_after_conflict() {
    let tmp = tempfile::tempdir().unwrap();
    let (remote, url) = bare_remote(tmp.path());
    let base = commit_to_remote(&remote, "main", &[("seed.txt", "s\n")], "seed");
    let (mut worker, metrics) = worker_on(tmp.path(), &url, "main").await;
    assert_eq!(worker.last_known_remote_head(), Some(base));

    // A concurrent writer lands foo at rv=500 behind the worker's back.
    commit_to_remote(
        &remote,
        "main",
        &[(
            "v1/pods/default/foo.yaml",
            "apiVersion: v1\nkind: Pod\nmetadata:\n  name: foo\n  namespace: default\n  resourceVersion: '500'\n",
        )],
        "concurrent writer",
    );

    worker.handle(WorkerCommand::Deliver(update_pod("foo", "300"))).await.unwrap();
    worker.handle(WorkerCommand::Deliver(update_pod("foo", "600"))).await.unwrap();
    worker.push_cycle().await.unwrap();

    // Only the rv=600 update survived the staleness filter.
    assert_eq!(
        remote_resource_version(&remote, "main", "v1/pods/default/foo.yaml").as_deref(),
        Some("600")
    );
    assert_eq!(metrics.snapshot().events_dropped_stale, 1);

    let messages = remote_messages(&remote, "main");
    assert_eq!(messages[0], "[UPDATE] v1/pods/foo by user/alice");
    assert_eq!(messages[1], "concurrent writer");
    // One commit for the surviving event, not two.
    assert_eq!(messages.iter().filter(|m| m.starts_with("[UPDATE]")).count(), 1);
}

#[tokio::test]
async fn secret_without_encryptor() {
    let tmp = tempfile::tempdir().unwrap();
    let (remote, url) = bare_remote(tmp.path());
    let (mut worker, _) = worker_on(tmp.path(), &url, "main").await;

    let err = worker.handle(WorkerCommand::Deliver(secret_event("bar"))).await.unwrap_err();
    assert!(matches!(err, EngineError::EncryptionRequired { .. }), "got {err:?}");

    // No plaintext anywhere: not in the worktree, not in any commit.
    assert!(!worker.workdir().join("v1/secrets/default/bar.yaml").exists());
    worker.push_cycle().await.unwrap();
    assert_eq!(remote_tip(&remote, "main"), None);

    // A non-secret resource still goes through afterwards.
    worker.handle(WorkerCommand::Deliver(create_pod("foo", "1"))).await.unwrap();
    worker.push_cycle().await.unwrap();
    assert!(remote_file(&remote, "main", "v1/pods/default/foo.yaml").is_some());
    assert!(remote_file(&remote, "main", "v1/secrets/default/bar.yaml").is_none());
}

#[tokio::test]
async fn empty_events_batch() {
    let tmp = tempfile::tempdir().unwrap();
    let (remote, url) = bare_remote(tmp.path());
    let (mut worker, metrics) = worker_on(tmp.path(), &url, "main").await;

    worker.push_cycle().await.unwrap();

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.pushes, 0, "no push attempt");
    assert_eq!(snapshot.commits_created, 0, "no commit");
    assert_eq!(remote_tip(&remote, "main"), None);
}

#[tokio::test]
async fn remote_branch_disappeared() {
    let tmp = tempfile::tempdir().unwrap();
    let (remote, url) = bare_remote(tmp.path());
    // Remote HEAD points at main; feature exists at c1.
    let main_tip = commit_to_remote(&remote, "main", &[("main.txt", "m\n")], "on main");
    let c1 = commit_to_remote(&remote, "feature", &[("seed.txt", "s\n")], "c1");

    let (mut worker, _) = worker_on(tmp.path(), &url, "feature").await;
    assert_eq!(worker.last_known_remote_head(), Some(c1));

    // Local c2 exists; the remote branch vanishes before the push.
    worker.handle(WorkerCommand::Deliver(create_pod("foo", "1"))).await.unwrap();
    delete_remote_branch(&remote, "feature");
    worker.push_cycle().await.unwrap();

    // The branch was recreated from the re-evaluated events on top of the
    // current remote HEAD.
    let messages = remote_messages(&remote, "feature");
    assert_eq!(
        messages,
        vec!["[CREATE] v1/pods/foo by user/alice".to_string(), "on main".to_string()]
    );
    let repo = git2::Repository::open(&remote).unwrap();
    let tip = remote_tip(&remote, "feature").unwrap();
    assert_eq!(repo.find_commit(tip).unwrap().parent_id(0).unwrap(), main_tip);
}

#[tokio::test]
async fn corrupted_existing_file_is_overwritten() {
    let tmp = tempfile::tempdir().unwrap();
    let (remote, url) = bare_remote(tmp.path());
    let (mut worker, _) = worker_on(tmp.path(), &url, "main").await;

    // A concurrent writer leaves an unparseable manifest behind.
    commit_to_remote(
        &remote,
        "main",
        &[("v1/pods/default/foo.yaml", "invalid: yaml: {{{")],
        "corrupted",
    );

    worker.handle(WorkerCommand::Deliver(update_pod("foo", "200"))).await.unwrap();
    worker.push_cycle().await.unwrap();

    // Staleness was inconclusive, so the event was kept and the file is
    // valid again, in a single commit.
    assert_eq!(
        remote_resource_version(&remote, "main", "v1/pods/default/foo.yaml").as_deref(),
        Some("200")
    );
    let messages = remote_messages(&remote, "main");
    assert_eq!(
        messages,
        vec!["[UPDATE] v1/pods/foo by user/alice".to_string(), "corrupted".to_string()]
    );
}
