// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expected-base push.
//!
//! The push succeeds only if the remote branch still equals the base the
//! local commits were built on; a concurrent writer surfaces as a tagged
//! conflict instead of a clobbered branch. The transport gives no typed
//! push result, so rejection reasons reported through the update-reference
//! callback are classified by keyword, with the one typed signal libgit2
//! does have (`ErrorCode::NotFastForward`) checked first.

use crate::checkout::LocalCheckout;
use crate::error::EngineError;
use gr_adapters::TransportAuth;
use std::cell::RefCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The remote branch now equals this local tip.
    Pushed(git2::Oid),
    /// Local and remote already agree; no push was attempted.
    NothingToPush,
}

/// Push the checkout's branch, requiring the remote tip to equal
/// `expected_base` (`None` for a brand-new branch).
pub fn push_atomic(
    checkout: &LocalCheckout,
    expected_base: Option<git2::Oid>,
    auth: &TransportAuth,
) -> Result<PushOutcome, EngineError> {
    let Some(new_tip) = checkout.head_oid()? else {
        // Unborn local branch: nothing was committed, nothing to ship.
        return Ok(PushOutcome::NothingToPush);
    };
    if Some(new_tip) == expected_base {
        return Ok(PushOutcome::NothingToPush);
    }

    // Probe the remote tip before transferring anything. The probe-push
    // window is still racy; the non-forced push below closes it.
    let status = checkout.probe_remote(auth)?;
    match (status.head, expected_base) {
        (Some(remote), Some(expected)) if remote != expected => {
            return Err(EngineError::NonFastForward);
        }
        (None, Some(_)) => return Err(EngineError::RemoteWentMissing),
        (Some(_), None) => return Err(EngineError::UnknownRemoteUpdates),
        _ => {}
    }

    let branch_ref = checkout.branch_ref();
    let refspec = format!("{branch_ref}:{branch_ref}");

    // None: callback never ran. Some(None): accepted. Some(Some(msg)):
    // rejected with the server's reason.
    let report: RefCell<Option<Option<String>>> = RefCell::new(None);

    let mut callbacks = auth.callbacks();
    callbacks.push_update_reference(|refname, server_status| {
        if refname == branch_ref {
            report.borrow_mut().replace(server_status.map(ToString::to_string));
        }
        Ok(())
    });

    let mut opts = git2::PushOptions::new();
    opts.remote_callbacks(callbacks);

    let mut remote = checkout.repo().find_remote("origin").map_err(EngineError::from)?;
    if let Err(e) = remote.push(&[refspec.as_str()], Some(&mut opts)) {
        return Err(classify_push_error(&e));
    }
    drop(remote);

    match report.take() {
        Some(None) => Ok(PushOutcome::Pushed(new_tip)),
        Some(Some(reason)) => Err(classify_rejection(&reason)),
        None => Err(EngineError::Transient(
            "push finished without reporting the branch status".to_string(),
        )),
    }
}

fn classify_push_error(e: &git2::Error) -> EngineError {
    if e.code() == git2::ErrorCode::Auth {
        return EngineError::AuthFailed(e.message().to_string());
    }
    if e.code() == git2::ErrorCode::NotFastForward {
        return EngineError::NonFastForward;
    }
    classify_rejection(e.message())
}

/// Keyword classification of a rejection reason.
fn classify_rejection(reason: &str) -> EngineError {
    let lower = reason.to_ascii_lowercase();
    if lower.contains("non-fast-forward")
        || lower.contains("fetch first")
        || lower.contains("updates were rejected")
        || lower.contains("cannot lock ref")
    {
        return EngineError::NonFastForward;
    }
    if lower.contains("not found") || lower.contains("unable to resolve") {
        return EngineError::RemoteWentMissing;
    }
    if lower.contains("unknown") {
        return EngineError::UnknownRemoteUpdates;
    }
    EngineError::Transient(reason.to_string())
}

#[cfg(test)]
#[path = "push_tests.rs"]
mod tests;
