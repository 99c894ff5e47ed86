// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker's local checkout.
//!
//! A working copy on durable storage, reused across push cycles and owned
//! exclusively by its branch worker. On every startup the `origin` remote
//! is reconciled against the configured URL (delete-and-recreate on
//! mismatch) and `HEAD` is pointed at the target branch, unborn or not.

use crate::error::EngineError;
use gr_adapters::TransportAuth;
use gr_core::{COMMIT_EMAIL, COMMIT_NAME};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

const ORIGIN: &str = "origin";

/// Result of the lightweight remote probe (no fetch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchStatus {
    pub exists_on_remote: bool,
    pub head: Option<git2::Oid>,
}

/// Outcome of a flex-pull: the tip to synchronize to, and whether it came
/// from the target branch itself (as opposed to the remote default branch
/// or nothing at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlexPull {
    pub tip: Option<git2::Oid>,
    pub branch_exists: bool,
}

pub struct LocalCheckout {
    repo: git2::Repository,
    workdir: PathBuf,
    branch: String,
}

impl LocalCheckout {
    /// Stable per-destination directory under the state root, derived from
    /// the remote URL and branch so restarts reuse the same checkout.
    pub fn derive_dir(state_root: &Path, url: &str, branch: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hasher.update([0]);
        hasher.update(branch.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        state_root.join(&digest[..16])
    }

    /// Open the checkout at `path`, creating it on first use, and reconcile
    /// its remote configuration.
    pub fn ensure(path: &Path, url: &str, branch: &str) -> Result<Self, EngineError> {
        std::fs::create_dir_all(path)?;
        let repo = match git2::Repository::open(path) {
            Ok(repo) => repo,
            Err(_) => git2::Repository::init(path)?,
        };

        match repo.find_remote(ORIGIN) {
            Ok(remote) => {
                let matches = remote.url() == Some(url);
                drop(remote);
                if !matches {
                    tracing::info!(
                        expected = url,
                        "checkout remote URL mismatch, recreating origin"
                    );
                    repo.remote_delete(ORIGIN)?;
                    repo.remote(ORIGIN, url)?;
                }
            }
            Err(_) => {
                repo.remote(ORIGIN, url)?;
            }
        }

        let workdir = repo
            .workdir()
            .ok_or_else(|| EngineError::ConfigInvalid("checkout repository is bare".to_string()))?
            .to_path_buf();
        let checkout = Self { repo, workdir, branch: branch.to_string() };
        // Point HEAD at the target branch; libgit2 accepts an unborn target.
        checkout.repo.set_head(&checkout.branch_ref())?;
        Ok(checkout)
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn branch_ref(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Absolute path of a repository-relative file.
    pub fn file_path(&self, rel: &Path) -> PathBuf {
        self.workdir.join(rel)
    }

    /// Local tip of the target branch; `None` while the branch is unborn.
    pub fn head_oid(&self) -> Result<Option<git2::Oid>, EngineError> {
        match self.repo.find_reference(&self.branch_ref()) {
            Ok(reference) => Ok(reference.target()),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// ls-remote the target branch without fetching.
    pub fn probe_remote(&self, auth: &TransportAuth) -> Result<BranchStatus, EngineError> {
        let mut remote = self.repo.find_remote(ORIGIN)?;
        let connection =
            remote.connect_auth(git2::Direction::Fetch, Some(auth.callbacks()), None)?;
        let target = self.branch_ref();
        let head = connection
            .list()?
            .iter()
            .find(|remote_head| remote_head.name() == target)
            .map(|remote_head| remote_head.oid());
        Ok(BranchStatus { exists_on_remote: head.is_some(), head })
    }

    /// Best-effort synchronization: the target branch, then the remote
    /// default branch, then nothing (caller falls back to an unborn local
    /// branch).
    pub fn flex_pull(&self, auth: &TransportAuth) -> Result<FlexPull, EngineError> {
        if let Some(tip) = self.fetch_tip(&self.branch_ref(), auth)? {
            return Ok(FlexPull { tip: Some(tip), branch_exists: true });
        }
        if let Some(tip) = self.fetch_tip("HEAD", auth)? {
            return Ok(FlexPull { tip: Some(tip), branch_exists: false });
        }
        Ok(FlexPull { tip: None, branch_exists: false })
    }

    /// Fetch one ref and return the fetched tip. A missing ref is a miss,
    /// not an error; transport failures propagate.
    fn fetch_tip(
        &self,
        refspec: &str,
        auth: &TransportAuth,
    ) -> Result<Option<git2::Oid>, EngineError> {
        // A stale FETCH_HEAD from an earlier cycle must not masquerade as
        // this fetch's result.
        let _ = std::fs::remove_file(self.repo.path().join("FETCH_HEAD"));

        let mut remote = self.repo.find_remote(ORIGIN)?;
        let mut opts = git2::FetchOptions::new();
        opts.remote_callbacks(auth.callbacks());
        if let Err(e) = remote.fetch(&[refspec], Some(&mut opts), None) {
            if ref_missing(&e) {
                tracing::debug!(refspec, "fetch target absent on remote");
                return Ok(None);
            }
            return Err(e.into());
        }
        match self.repo.find_reference("FETCH_HEAD") {
            Ok(fetch_head) => Ok(Some(fetch_head.peel_to_commit()?.id())),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Hard-reset branch, index and worktree to `tip`; `None` resets to an
    /// unborn branch with an empty index and a clean worktree.
    pub fn sync_to(&self, tip: Option<git2::Oid>) -> Result<(), EngineError> {
        match tip {
            Some(oid) => {
                self.repo.reference(&self.branch_ref(), oid, true, "flex-pull")?;
                self.repo.set_head(&self.branch_ref())?;
                let target = self.repo.find_object(oid, None)?;
                self.repo.reset(&target, git2::ResetType::Hard, None)?;
            }
            None => self.reset_unborn()?,
        }
        Ok(())
    }

    fn reset_unborn(&self) -> Result<(), EngineError> {
        if let Ok(mut reference) = self.repo.find_reference(&self.branch_ref()) {
            reference.delete()?;
        }
        self.repo.set_head(&self.branch_ref())?;

        let mut index = self.repo.index()?;
        index.clear()?;
        index.write()?;

        for entry in std::fs::read_dir(&self.workdir)? {
            let entry = entry?;
            if entry.file_name() == ".git" {
                continue;
            }
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Stage one repository-relative path (add or update).
    pub fn stage(&self, rel: &Path) -> Result<(), EngineError> {
        let mut index = self.repo.index()?;
        index.add_path(rel)?;
        index.write()?;
        Ok(())
    }

    /// Stage the removal of one repository-relative path.
    pub fn stage_removal(&self, rel: &Path) -> Result<(), EngineError> {
        let mut index = self.repo.index()?;
        index.remove_path(rel)?;
        index.write()?;
        Ok(())
    }

    /// Commit the current index onto the target branch with the fixed
    /// system identity. Creates the branch when it is unborn.
    pub fn commit_index(&self, message: &str) -> Result<git2::Oid, EngineError> {
        let mut index = self.repo.index()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;
        let signature = git2::Signature::now(COMMIT_NAME, COMMIT_EMAIL)?;

        let parent = match self.head_oid()? {
            Some(oid) => Some(self.repo.find_commit(oid)?),
            None => None,
        };
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        // HEAD is symbolic to the target branch, so this moves (or creates)
        // the branch ref.
        let oid = self.repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        Ok(oid)
    }

    pub(crate) fn repo(&self) -> &git2::Repository {
        &self.repo
    }
}

/// Did this fetch fail because the requested ref does not exist? The
/// wording differs per transport, so match the known phrasings.
fn ref_missing(e: &git2::Error) -> bool {
    if e.code() == git2::ErrorCode::NotFound {
        return true;
    }
    let message = e.message().to_ascii_lowercase();
    message.contains("remote ref")
        || message.contains("couldn't find")
        || message.contains("not found")
        || message.contains("matching remote head")
}

#[cfg(test)]
#[path = "checkout_tests.rs"]
mod tests;
