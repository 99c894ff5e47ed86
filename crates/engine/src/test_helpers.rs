// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests: file-backed bare remotes and event
//! builders.

use gr_core::{Event, ResourceIdentifier, UserInfo};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::{DynamicObject, TypeMeta};
use std::path::{Path, PathBuf};

/// Bare repository under `dir` plus its `file://` URL.
pub(crate) fn bare_remote(dir: &Path) -> (PathBuf, String) {
    let path = dir.join("remote.git");
    git2::Repository::init_bare(&path).unwrap();
    let url = format!("file://{}", path.display());
    (path, url)
}

/// Commit files directly into a bare remote's branch, on top of the
/// current tip (creating the branch if needed). Returns the new tip.
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
    // Give the remote a HEAD so clones and HEAD fetches resolve.
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

/// Commit messages on a branch, newest first.
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

/// Contents of one file in the branch tip's tree.
pub(crate) fn remote_file(remote: &Path, branch: &str, path: &str) -> Option<Vec<u8>> {
    let repo = git2::Repository::open(remote).unwrap();
    let tip = remote_tip(remote, branch)?;
    let tree = repo.find_commit(tip).unwrap().tree().unwrap();
    let entry = tree.get_path(Path::new(path)).ok()?;
    let content = repo.find_blob(entry.id()).unwrap().content().to_vec();
    Some(content)
}

pub(crate) fn pod_object(name: &str, namespace: &str, rv: &str, uid: &str) -> DynamicObject {
    DynamicObject {
        types: Some(TypeMeta { api_version: "v1".to_string(), kind: "Pod".to_string() }),
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(uid.to_string()),
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

pub(crate) fn create_pod_event(name: &str, rv: &str) -> Event {
    Event::create(
        pod_object(name, "default", rv, &format!("uid-{name}")),
        pod_id(name),
        UserInfo::new("alice"),
        "",
    )
}

pub(crate) fn update_pod_event(name: &str, rv: &str) -> Event {
    Event::update(
        pod_object(name, "default", rv, &format!("uid-{name}")),
        pod_id(name),
        UserInfo::new("alice"),
        "",
    )
}
