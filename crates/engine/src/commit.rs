// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Translating events into worktree mutations and commits.
//!
//! One commit per event that produced a textual change; events whose
//! serialized content equals the file on disk are absorbed silently.
//!
//! The engine itself is synchronous: content is rendered (and possibly
//! encrypted) before it is handed over, so the checkout is never borrowed
//! across a suspension point. The worker drives the async rendering.

use crate::checkout::LocalCheckout;
use crate::error::EngineError;
use gr_adapters::ContentWriter;
use gr_core::{commit_message, sanitize_base_folder, Event, Operation};
use std::path::PathBuf;

pub struct CommitEngine<'a> {
    checkout: &'a LocalCheckout,
}

impl<'a> CommitEngine<'a> {
    pub fn new(checkout: &'a LocalCheckout) -> Self {
        Self { checkout }
    }

    /// Repository-relative target file for an event.
    pub fn target_path(event: &Event) -> Result<PathBuf, EngineError> {
        let base = sanitize_base_folder(&event.base_folder)?;
        Ok(base.join(event.identifier.to_repo_path()?))
    }

    /// Produce the bytes for a `CREATE`/`UPDATE` event; `None` for
    /// operations that carry no content. Errors here mean nothing has been
    /// written anywhere.
    pub async fn render(
        writer: &ContentWriter,
        event: &Event,
    ) -> Result<Option<Vec<u8>>, EngineError> {
        match event.operation {
            Operation::Create | Operation::Update => Ok(Some(writer.render(event).await?)),
            Operation::Delete | Operation::SeedSync { .. } => Ok(None),
        }
    }

    /// Apply one event with its pre-rendered content; `Ok(Some(oid))` when
    /// it produced a commit.
    pub fn apply(
        &self,
        event: &Event,
        rendered: Option<&[u8]>,
    ) -> Result<Option<git2::Oid>, EngineError> {
        match &event.operation {
            // Control events mutate nothing themselves.
            Operation::SeedSync { .. } => Ok(None),
            Operation::Delete => self.apply_delete(event),
            Operation::Create | Operation::Update => {
                let bytes = rendered.ok_or_else(|| {
                    EngineError::ConfigInvalid(format!(
                        "no rendered content for {}",
                        event.identifier
                    ))
                })?;
                self.apply_write(event, bytes)
            }
        }
    }

    fn apply_delete(&self, event: &Event) -> Result<Option<git2::Oid>, EngineError> {
        let rel = Self::target_path(event)?;
        let abs = self.checkout.file_path(&rel);
        if !abs.exists() {
            // Deleting what is not there is a no-op, not an error.
            return Ok(None);
        }
        std::fs::remove_file(&abs)?;
        self.checkout.stage_removal(&rel)?;
        let message = commit_message(&event.operation, &event.identifier, &event.user);
        let oid = self.checkout.commit_index(&message)?;
        Ok(Some(oid))
    }

    fn apply_write(&self, event: &Event, bytes: &[u8]) -> Result<Option<git2::Oid>, EngineError> {
        let rel = Self::target_path(event)?;
        let abs = self.checkout.file_path(&rel);

        if let Ok(existing) = std::fs::read(&abs) {
            if existing == bytes {
                return Ok(None);
            }
        }

        if let Some(parent) = abs.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_atomic(&abs, bytes)?;
        self.checkout.stage(&rel)?;

        let message = commit_message(&event.operation, &event.identifier, &event.user);
        let oid = self.checkout.commit_index(&message)?;
        Ok(Some(oid))
    }
}

/// Temp-file-and-rename so a crash never leaves a torn manifest.
fn write_atomic(abs: &std::path::Path, bytes: &[u8]) -> Result<(), EngineError> {
    let file_name = abs
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| EngineError::ConfigInvalid(format!("bad target path {abs:?}")))?;
    let tmp = abs.with_file_name(format!(".{file_name}.tmp"));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, abs)?;
    Ok(())
}

#[cfg(test)]
#[path = "commit_tests.rs"]
mod tests;
