// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-cutting properties: push linearizability and staleness
//! monotonicity.

use super::helpers::*;
use gr_adapters::TransportAuth;
use gr_engine::{push_atomic, EngineError, LocalCheckout, PushOutcome, WorkerCommand};
use std::path::Path;

fn competing_checkout(tmp: &Path, url: &str, name: &str) -> (LocalCheckout, git2::Oid) {
    let auth = TransportAuth::Anonymous;
    let checkout = LocalCheckout::ensure(&tmp.join(name), url, "main").unwrap();
    let pull = checkout.flex_pull(&auth).unwrap();
    checkout.sync_to(pull.tip).unwrap();

    let file = format!("{name}.txt");
    std::fs::write(checkout.file_path(Path::new(&file)), name).unwrap();
    checkout.stage(Path::new(&file)).unwrap();
    let tip = checkout.commit_index(&format!("from {name}")).unwrap();
    (checkout, tip)
}

#[tokio::test]
async fn atomic_push_is_linearizable() {
    let tmp = tempfile::tempdir().unwrap();
    let (remote, url) = bare_remote(tmp.path());
    let base = commit_to_remote(&remote, "main", &[("seed.txt", "s\n")], "seed");

    // Two writers build on the same expected base.
    let (a, tip_a) = competing_checkout(tmp.path(), &url, "a");
    let (b, tip_b) = competing_checkout(tmp.path(), &url, "b");
    let auth = TransportAuth::Anonymous;

    let first = push_atomic(&a, Some(base), &auth);
    let second = push_atomic(&b, Some(base), &auth);

    // Exactly one wins; the other is told the remote advanced.
    assert!(matches!(first, Ok(PushOutcome::Pushed(t)) if t == tip_a));
    assert!(matches!(second, Err(EngineError::NonFastForward)));
    assert_eq!(remote_tip(&remote, "main"), Some(tip_a));
    let _ = tip_b;
}

/// rv(e1) < rv(e2): whatever order they are processed in, once a
/// conflict-driven refresh runs, the committed file reflects e2.
#[tokio::test]
async fn staleness_monotonicity_e2_then_e1() {
    let tmp = tempfile::tempdir().unwrap();
    let (remote, url) = bare_remote(tmp.path());
    let (mut worker, _) = worker_on(tmp.path(), &url, "main").await;

    // e2 lands and is pushed.
    worker.handle(WorkerCommand::Deliver(update_pod("foo", "200"))).await.unwrap();
    worker.push_cycle().await.unwrap();

    // e1 arrives late and is committed locally over e2's state.
    worker.handle(WorkerCommand::Deliver(update_pod("foo", "100"))).await.unwrap();

    // A concurrent writer forces the next push into conflict recovery.
    commit_to_remote(&remote, "main", &[("other.txt", "x\n")], "concurrent writer");
    worker.push_cycle().await.unwrap();

    assert_eq!(
        remote_resource_version(&remote, "main", "v1/pods/default/foo.yaml").as_deref(),
        Some("200"),
        "the refresh must drop the stale e1"
    );
}

#[tokio::test]
async fn staleness_monotonicity_e1_then_e2() {
    let tmp = tempfile::tempdir().unwrap();
    let (remote, url) = bare_remote(tmp.path());
    let (mut worker, _) = worker_on(tmp.path(), &url, "main").await;

    worker.handle(WorkerCommand::Deliver(update_pod("foo", "100"))).await.unwrap();
    worker.push_cycle().await.unwrap();

    worker.handle(WorkerCommand::Deliver(update_pod("foo", "200"))).await.unwrap();
    commit_to_remote(&remote, "main", &[("other.txt", "x\n")], "concurrent writer");
    worker.push_cycle().await.unwrap();

    assert_eq!(
        remote_resource_version(&remote, "main", "v1/pods/default/foo.yaml").as_deref(),
        Some("200"),
        "the newer e2 must survive the refresh"
    );
}
