// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness: file-backed bare remotes, event builders and a worker
//! factory with test-mode policy.

use gr_core::{BranchKey, Event, FakeClock, ResourceIdentifier, UserInfo};
use gr_engine::metrics::EngineMetrics;
use gr_engine::{BranchWorker, ProviderConfig, PushPolicy, WorkerContext};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::{DynamicObject, TypeMeta};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// `RUST_LOG`-filtered tracing output for scenario diagnostics. Safe to
/// call from every test; only the first call installs the subscriber.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub(crate) fn bare_remote(dir: &Path) -> (PathBuf, String) {
    init_tracing();
    let path = dir.join("remote.git");
    git2::Repository::init_bare(&path).unwrap();
    let url = format!("file://{}", path.display());
    (path, url)
}

/// Commit files directly into the bare remote, as a concurrent writer
/// would. Returns the new tip.
pub(crate) fn commit_to_remote(
    remote: &Path,
    branch: &str,
    files: &[(&str, &str)],
    message: &str,
) -> git2::Oid {
    let repo = git2::Repository::open(remote).unwrap();
    let refname = format!("refs/heads/{branch}");

    let parent = repo
        .find_reference(&refname)
        .ok()
        .and_then(|r| r.target())
        .map(|oid| repo.find_commit(oid).unwrap());
    let base_tree = match &parent {
        Some(commit) => commit.tree().unwrap(),
        None => {
            let empty = repo.treebuilder(None).unwrap().write().unwrap();
            repo.find_tree(empty).unwrap()
        }
    };

    let mut update = git2::build::TreeUpdateBuilder::new();
    for (path, contents) in files {
        let blob = repo.blob(contents.as_bytes()).unwrap();
        update.upsert(*path, blob, git2::FileMode::Blob);
    }
    let tree_oid = update.create_updated(&repo, &base_tree).unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();

    let sig = git2::Signature::now("Remote Writer", "writer@example.com").unwrap();
    let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
    let oid = repo.commit(Some(&refname), &sig, &sig, message, &tree, &parents).unwrap();
    if repo.head().is_err() {
        repo.set_head(&refname).unwrap();
    }
    oid
}

pub(crate) fn delete_remote_branch(remote: &Path, branch: &str) {
    let repo = git2::Repository::open(remote).unwrap();
    let mut reference = repo.find_reference(&format!("refs/heads/{branch}")).unwrap();
    reference.delete().unwrap();
}

pub(crate) fn remote_tip(remote: &Path, branch: &str) -> Option<git2::Oid> {
    let repo = git2::Repository::open(remote).unwrap();
    repo.find_reference(&format!("refs/heads/{branch}")).ok().and_then(|r| r.target())
}

/// Commit messages on the branch, newest first.
pub(crate) fn remote_messages(remote: &Path, branch: &str) -> Vec<String> {
    let repo = git2::Repository::open(remote).unwrap();
    let Some(tip) = remote_tip(remote, branch) else { return Vec::new() };
    let mut walk = repo.revwalk().unwrap();
    walk.push(tip).unwrap();
    walk.map(|oid| {
        let commit = repo.find_commit(oid.unwrap()).unwrap();
        commit.message().unwrap_or_default().trim_end().to_string()
    })
    .collect()
}

pub(crate) fn remote_file(remote: &Path, branch: &str, path: &str) -> Option<Vec<u8>> {
    let repo = git2::Repository::open(remote).unwrap();
    let tip = remote_tip(remote, branch)?;
    let tree = repo.find_commit(tip).unwrap().tree().unwrap();
    let entry = tree.get_path(Path::new(path)).ok()?;
    let content = repo.find_blob(entry.id()).unwrap().content().to_vec();
    Some(content)
}

/// `metadata.resourceVersion` of a manifest on the remote.
pub(crate) fn remote_resource_version(remote: &Path, branch: &str, path: &str) -> Option<String> {
    let bytes = remote_file(remote, branch, path)?;
    let doc: serde_json::Value = serde_yaml::from_slice(&bytes).ok()?;
    doc.get("metadata")?.get("resourceVersion")?.as_str().map(str::to_string)
}

pub(crate) fn pod_object(name: &str, namespace: &str, rv: &str) -> DynamicObject {
    DynamicObject {
        types: Some(TypeMeta { api_version: "v1".to_string(), kind: "Pod".to_string() }),
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{name}")),
            resource_version: Some(rv.to_string()),
            generation: Some(1),
            ..ObjectMeta::default()
        },
        data: serde_json::json!({"spec": {"nodeName": "node-1"}}),
    }
}

pub(crate) fn pod_id(name: &str) -> ResourceIdentifier {
    ResourceIdentifier::namespaced("", "v1", "pods", "default", name)
}

pub(crate) fn create_pod(name: &str, rv: &str) -> Event {
    Event::create(pod_object(name, "default", rv), pod_id(name), UserInfo::new("alice"), "")
}

pub(crate) fn update_pod(name: &str, rv: &str) -> Event {
    Event::update(pod_object(name, "default", rv), pod_id(name), UserInfo::new("alice"), "")
}

pub(crate) fn secret_event(name: &str) -> Event {
    let id = ResourceIdentifier::namespaced("", "v1", "secrets", "default", name);
    let object = DynamicObject {
        types: Some(TypeMeta { api_version: "v1".to_string(), kind: "Secret".to_string() }),
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            uid: Some(format!("uid-{name}")),
            resource_version: Some("1".to_string()),
            ..ObjectMeta::default()
        },
        data: serde_json::json!({"data": {"password": "cGxhaW4="}}),
    };
    Event::create(object, id, UserInfo::new("alice"), "")
}

/// Worker with test-mode policy, anonymous auth and no encryption,
/// together with its metrics handle.
pub(crate) async fn worker_on(
    state_root: &Path,
    url: &str,
    branch: &str,
) -> (BranchWorker<FakeClock>, Arc<EngineMetrics>) {
    let metrics = Arc::new(EngineMetrics::default());
    let ctx = WorkerContext {
        key: BranchKey::new("gitops", "origin", branch),
        config: ProviderConfig {
            remote_url: url.to_string(),
            auth: gr_adapters::TransportAuth::Anonymous,
            encryption: None,
            policy: PushPolicy::test_mode(),
        },
        state_root: state_root.to_path_buf(),
        metrics: metrics.clone(),
    };
    let worker = BranchWorker::initialize(ctx, FakeClock::new()).await.unwrap();
    (worker, metrics)
}
