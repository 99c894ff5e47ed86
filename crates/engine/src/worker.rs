// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-branch worker.
//!
//! One cooperative task per `BranchKey`, owning one local checkout. The
//! loop drains its bounded inbox, applies each event immediately (one
//! commit per event that changed the tree), and ships accumulated commits
//! on a ticker, when the batch cap is reached, or shortly after a fresh
//! batch starts. Push conflicts trigger flex-pull recovery with staleness
//! re-evaluation of the pending events.

use crate::bootstrap::bootstrap_files;
use crate::checkout::LocalCheckout;
use crate::commit::CommitEngine;
use crate::config::PushPolicy;
use crate::error::EngineError;
use crate::metrics::EngineMetrics;
use crate::provider::ProviderConfig;
use crate::push::{push_atomic, PushOutcome};
use crate::stale::{self, StaleVerdict};
use gr_adapters::{ContentWriter, Encryptor, SopsEncryptor, TransportAuth};
use gr_core::{
    bootstrap_message, commit_message, sanitize_base_folder, BranchKey, Clock, Event, Operation,
    ResourceIdentifier, UserInfo,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Suggested inbox capacity per worker.
pub const WORKER_INBOX_CAPACITY: usize = 100;

/// What the registry and router put into a worker's inbox.
#[derive(Debug)]
pub enum WorkerCommand {
    Deliver(Event),
    Bootstrap { base_folder: String },
}

/// Everything a worker needs at creation time.
pub struct WorkerContext {
    pub key: BranchKey,
    pub config: ProviderConfig,
    /// Root under which checkouts and encryption scratch dirs live.
    pub state_root: PathBuf,
    pub metrics: Arc<EngineMetrics>,
}

pub struct BranchWorker<C: Clock> {
    key: BranchKey,
    checkout: LocalCheckout,
    writer: ContentWriter,
    encryptor: Option<Arc<SopsEncryptor>>,
    auth: TransportAuth,
    policy: PushPolicy,
    clock: C,
    metrics: Arc<EngineMetrics>,
    /// Tip of the remote branch as last observed; push expected base.
    last_known_remote_head: Option<git2::Oid>,
    /// Events applied since the last successful push cycle; re-evaluated
    /// against the refreshed tree during conflict recovery.
    pending: Vec<Event>,
    /// Early-push deadline armed when a fresh batch starts.
    batch_deadline: Option<tokio::time::Instant>,
}

impl<C: Clock> BranchWorker<C> {
    /// Resolve credentials and encryption, ensure the local checkout, and
    /// synchronize with the remote once. Failures propagate to the caller
    /// (the registry refuses the target).
    pub async fn initialize(ctx: WorkerContext, clock: C) -> Result<Self, EngineError> {
        let WorkerContext { key, config, state_root, metrics } = ctx;
        let ProviderConfig { remote_url, auth, encryption, policy } = config;

        let dir = LocalCheckout::derive_dir(&state_root, &remote_url, &key.branch);
        let checkout = LocalCheckout::ensure(&dir, &remote_url, &key.branch)?;

        if let Some(known_hosts) = auth.known_hosts() {
            let path = sibling(&dir, "known_hosts");
            std::fs::write(&path, known_hosts)?;
        }

        let encryptor = match encryption {
            Some(cfg) => {
                let work_dir = sibling(&dir, "enc");
                let enc = SopsEncryptor::prepare(cfg, work_dir)
                    .await
                    .map_err(|e| EngineError::ConfigInvalid(e.to_string()))?;
                Some(Arc::new(enc))
            }
            None => None,
        };
        let writer =
            ContentWriter::new(encryptor.clone().map(|e| e as Arc<dyn Encryptor>));

        let mut worker = Self {
            key,
            checkout,
            writer,
            encryptor,
            auth,
            policy,
            clock,
            metrics,
            last_known_remote_head: None,
            pending: Vec::new(),
            batch_deadline: None,
        };
        worker.sync_with_remote()?;
        tracing::info!(
            branch = %worker.key,
            head = ?worker.last_known_remote_head,
            "branch worker initialized"
        );
        Ok(worker)
    }

    pub fn key(&self) -> &BranchKey {
        &self.key
    }

    pub fn workdir(&self) -> &Path {
        self.checkout.workdir()
    }

    pub fn last_known_remote_head(&self) -> Option<git2::Oid> {
        self.last_known_remote_head
    }

    /// The worker loop. Exits when cancelled or when the inbox closes.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<WorkerCommand>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.policy.push_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let deadline = self.batch_deadline;
            tokio::select! {
                () = cancel.cancelled() => {
                    self.stop().await;
                    return;
                }
                command = inbox.recv() => match command {
                    Some(command) => {
                        self.metrics.set_queue_depth(inbox.len() as u64);
                        if let Err(e) = self.handle(command).await {
                            tracing::warn!(branch = %self.key, error = %e, "command failed");
                        }
                        if self.pending.len() >= self.policy.max_batch {
                            self.push_cycle_logged().await;
                        }
                    }
                    None => {
                        self.stop().await;
                        return;
                    }
                },
                _ = ticker.tick() => {
                    self.push_cycle_logged().await;
                }
                () = tokio::time::sleep_until(
                    deadline.unwrap_or_else(tokio::time::Instant::now)
                ), if deadline.is_some() => {
                    self.push_cycle_logged().await;
                }
            }
        }
    }

    /// Apply one inbox command. Event-fatal errors are returned (and
    /// logged by the loop); the worker keeps running either way.
    pub async fn handle(&mut self, command: WorkerCommand) -> Result<(), EngineError> {
        match command {
            WorkerCommand::Deliver(event) => self.apply_event(event).await,
            WorkerCommand::Bootstrap { base_folder } => {
                self.ensure_path_bootstrapped(&base_folder).await
            }
        }
    }

    async fn apply_event(&mut self, event: Event) -> Result<(), EngineError> {
        self.metrics.event_received();

        if let Operation::SeedSync { live } = &event.operation {
            let removed = self.orphan_sweep(live, &event.user, &event.base_folder)?;
            if removed > 0 {
                tracing::info!(branch = %self.key, removed, "orphan sweep removed files");
            }
            self.metrics.event_processed();
            return Ok(());
        }

        // Render first (this is where encryption can fail, before anything
        // touches the tree), then apply synchronously.
        let rendered = match CommitEngine::render(&self.writer, &event).await {
            Ok(rendered) => rendered,
            Err(e) => {
                self.metrics.event_processed();
                return Err(e);
            }
        };
        match CommitEngine::new(&self.checkout).apply(&event, rendered.as_deref()) {
            Ok(Some(oid)) => {
                self.metrics.commit_created();
                tracing::debug!(
                    branch = %self.key,
                    identifier = %event.identifier,
                    commit = %oid,
                    "event committed"
                );
            }
            Ok(None) => {
                tracing::debug!(
                    branch = %self.key,
                    identifier = %event.identifier,
                    "event absorbed (no textual change)"
                );
            }
            Err(e) => {
                self.metrics.event_processed();
                return Err(e);
            }
        }

        if self.pending.is_empty() {
            self.batch_deadline =
                Some(tokio::time::Instant::now() + self.policy.batch_latency);
        }
        self.pending.push(event);
        self.metrics.event_processed();
        Ok(())
    }

    fn push_due(&self) -> bool {
        !self.pending.is_empty()
    }

    async fn push_cycle_logged(&mut self) {
        if let Err(e) = self.push_cycle().await {
            tracing::warn!(branch = %self.key, error = %e, "push cycle failed");
        }
    }

    /// Ship every commit created since the last successful push. Conflicts
    /// trigger recovery and a bounded number of re-pushes; on exhaustion
    /// the pending events stay queued for the next cycle.
    pub async fn push_cycle(&mut self) -> Result<(), EngineError> {
        self.batch_deadline = None;
        if self.checkout.head_oid()? == self.last_known_remote_head {
            // Nothing was committed since the last push.
            self.pending.clear();
            return Ok(());
        }

        let started = self.clock.now();
        let mut last_error = EngineError::Transient("push retries exhausted".to_string());

        for attempt in 1..=self.policy.retry_limit {
            match push_atomic(&self.checkout, self.last_known_remote_head, &self.auth) {
                Ok(PushOutcome::Pushed(tip)) => {
                    self.last_known_remote_head = Some(tip);
                    self.pending.clear();
                    let elapsed = self.clock.now().duration_since(started);
                    self.metrics.push_succeeded(elapsed.as_millis() as u64);
                    tracing::debug!(branch = %self.key, tip = %tip, attempt, "pushed");
                    return Ok(());
                }
                Ok(PushOutcome::NothingToPush) => {
                    self.pending.clear();
                    return Ok(());
                }
                Err(e) if e.is_push_conflict() => {
                    self.metrics.push_conflict();
                    tracing::info!(
                        branch = %self.key,
                        attempt,
                        error = %e,
                        "push conflict, re-synchronizing with remote"
                    );
                    self.recover().await?;
                    last_error = e;
                }
                Err(e) if e.is_transient() => {
                    tracing::debug!(branch = %self.key, attempt, error = %e, "transient push failure");
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    /// Conflict recovery: flex-pull, hard reset, staleness re-evaluation,
    /// re-apply of the surviving events onto the new base.
    async fn recover(&mut self) -> Result<(), EngineError> {
        self.sync_with_remote()?;

        let pending = std::mem::take(&mut self.pending);
        let mut kept = Vec::with_capacity(pending.len());
        for event in pending {
            let existing = match CommitEngine::target_path(&event) {
                Ok(rel) => std::fs::read(self.checkout.file_path(&rel)).ok(),
                Err(_) => None,
            };
            match stale::evaluate(&event, existing.as_deref()) {
                StaleVerdict::Drop => {
                    self.metrics.event_dropped_stale();
                    tracing::debug!(
                        branch = %self.key,
                        identifier = %event.identifier,
                        "dropping stale event after conflict pull"
                    );
                }
                StaleVerdict::Keep => kept.push(event),
            }
        }
        self.pending = kept;

        // Re-apply in order; a failing event aborts the rest of the batch
        // with the commits already created left intact.
        let mut committed = 0;
        let mut failure = None;
        for event in &self.pending {
            let rendered = match CommitEngine::render(&self.writer, event).await {
                Ok(rendered) => rendered,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            match CommitEngine::new(&self.checkout).apply(event, rendered.as_deref()) {
                Ok(Some(_)) => committed += 1,
                Ok(None) => {}
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        for _ in 0..committed {
            self.metrics.commit_created();
        }
        if let Some(failure) = failure {
            tracing::warn!(
                branch = %self.key,
                error = %failure,
                "event failed during conflict re-apply, aborting batch"
            );
            return Err(failure);
        }
        Ok(())
    }

    /// Fetch the remote state and hard-reset onto it. Only a tip fetched
    /// from the target branch itself becomes the push expected-base.
    fn sync_with_remote(&mut self) -> Result<(), EngineError> {
        let pull = self.checkout.flex_pull(&self.auth)?;
        self.checkout.sync_to(pull.tip)?;
        self.last_known_remote_head = if pull.branch_exists { pull.tip } else { None };
        Ok(())
    }

    /// Remove files under the managed subtree whose identifier is not in
    /// the declared-live set. Files that do not parse as resource paths
    /// (bootstrap templates, hand-placed docs) are left alone.
    fn orphan_sweep(
        &mut self,
        live: &BTreeSet<ResourceIdentifier>,
        user: &UserInfo,
        base_folder: &str,
    ) -> Result<usize, EngineError> {
        let base = sanitize_base_folder(base_folder)?;
        let root = self.checkout.file_path(&base);
        if !root.is_dir() {
            return Ok(0);
        }

        let mut files = Vec::new();
        collect_files(&root, &mut files)?;

        let mut removed = 0;
        for abs in files {
            let Ok(in_base) = abs.strip_prefix(&root) else { continue };
            let Some(rel_str) = in_base.to_str() else { continue };
            let Ok(identifier) = ResourceIdentifier::parse_repo_path(rel_str) else {
                continue;
            };
            if live.contains(&identifier) {
                continue;
            }

            std::fs::remove_file(&abs)?;
            let rel_repo = base.join(in_base);
            self.checkout.stage_removal(&rel_repo)?;
            let message = commit_message(&Operation::Delete, &identifier, user);
            self.checkout.commit_index(&message)?;
            self.metrics.commit_created();
            removed += 1;

            if self.pending.is_empty() {
                self.batch_deadline =
                    Some(tokio::time::Instant::now() + self.policy.batch_latency);
            }
            self.pending.push(Event::delete(identifier, user.clone(), base_folder));
        }
        Ok(removed)
    }

    /// Materialize bootstrap templates when the managed subtree is empty,
    /// commit them with the fixed chore message and push. Idempotent.
    pub async fn ensure_path_bootstrapped(
        &mut self,
        base_folder: &str,
    ) -> Result<(), EngineError> {
        let base = sanitize_base_folder(base_folder)?;
        let root = self.checkout.file_path(&base);

        // The repository root always contains `.git`; ignore it when
        // deciding emptiness.
        let non_empty = root.is_dir()
            && std::fs::read_dir(&root)?
                .filter_map(Result::ok)
                .any(|entry| entry.file_name() != ".git");
        if non_empty {
            return Ok(());
        }

        std::fs::create_dir_all(&root)?;
        for (name, contents) in bootstrap_files(base_folder, &self.writer) {
            let rel = base.join(&name);
            std::fs::write(self.checkout.file_path(&rel), contents)?;
            self.checkout.stage(&rel)?;
        }
        self.checkout.commit_index(&bootstrap_message(base_folder))?;
        self.metrics.commit_created();
        tracing::info!(branch = %self.key, base_folder, "bootstrapped managed subtree");

        self.push_cycle().await
    }

    /// Flush the pending batch within the drain deadline, then release
    /// encryption material.
    async fn stop(&mut self) {
        if self.push_due() {
            let flush = tokio::time::timeout(self.policy.drain_deadline, self.push_cycle());
            match flush.await {
                Ok(Err(e)) => {
                    tracing::warn!(branch = %self.key, error = %e, "final flush failed")
                }
                Err(_) => tracing::warn!(branch = %self.key, "final flush hit drain deadline"),
                Ok(Ok(())) => {}
            }
        }
        if let Some(encryptor) = &self.encryptor {
            encryptor.cleanup().await;
        }
        tracing::info!(branch = %self.key, "branch worker stopped");
    }
}

/// `<dir>` → `<dir>-<suffix>` next to the checkout.
fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or("worker");
    dir.with_file_name(format!("{name}-{suffix}"))
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), EngineError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            if entry.file_name() == ".git" {
                continue;
            }
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
