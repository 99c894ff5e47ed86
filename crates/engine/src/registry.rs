// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker registry: BranchKey → live branch worker.
//!
//! The registry is the sole owner of every worker (workers hold no
//! reference back). Mutation takes the writer lock; the router only ever
//! takes the reader lock. Only the elected leader instantiates workers;
//! two processes pushing the same branch would fight forever.

use crate::error::EngineError;
use crate::metrics::EngineMetrics;
use crate::provider::ProviderResolver;
use crate::router::EventRouter;
use crate::worker::{BranchWorker, WorkerCommand, WorkerContext, WORKER_INBOX_CAPACITY};
use gr_adapters::LeaderGate;
use gr_core::{BranchKey, Clock};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub(crate) struct WorkerHandle {
    pub(crate) tx: mpsc::Sender<WorkerCommand>,
    cancel: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

pub(crate) type WorkerTable = RwLock<HashMap<BranchKey, WorkerHandle>>;

struct RegisteredTarget {
    key: BranchKey,
    #[allow(dead_code)] // kept for the reference-counting refinement
    base_folder: String,
}

pub struct WorkerRegistry<L, P, C>
where
    L: LeaderGate,
    P: ProviderResolver,
    C: Clock,
{
    workers: Arc<WorkerTable>,
    targets: Mutex<HashMap<String, RegisteredTarget>>,
    leader: L,
    provider: P,
    clock: C,
    state_root: PathBuf,
    metrics: Arc<EngineMetrics>,
    lifetime: Mutex<Option<CancellationToken>>,
    /// Serializes worker creation so two registrations of one key cannot
    /// race past the map check.
    spawn_lock: tokio::sync::Mutex<()>,
}

impl<L, P, C> WorkerRegistry<L, P, C>
where
    L: LeaderGate,
    P: ProviderResolver,
    C: Clock,
{
    pub fn new(leader: L, provider: P, clock: C, state_root: impl Into<PathBuf>) -> Self {
        Self {
            workers: Arc::new(RwLock::new(HashMap::new())),
            targets: Mutex::new(HashMap::new()),
            leader,
            provider,
            clock,
            state_root: state_root.into(),
            metrics: Arc::new(EngineMetrics::default()),
            lifetime: Mutex::new(None),
            spawn_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Begin the registry's lifetime under the given context; workers are
    /// spawned as children of it.
    pub fn start(&self, lifetime: CancellationToken) {
        *self.lifetime.lock() = Some(lifetime);
    }

    /// Stop every worker and end the lifetime.
    pub async fn stop(&self) {
        let keys: Vec<BranchKey> = self.workers.read().keys().cloned().collect();
        for key in keys {
            self.stop_worker(&key).await;
        }
        *self.lifetime.lock() = None;
    }

    pub fn metrics(&self) -> Arc<EngineMetrics> {
        self.metrics.clone()
    }

    /// A router over this registry's worker table.
    pub fn router(&self) -> EventRouter {
        EventRouter::new(self.workers.clone())
    }

    /// Create (or reuse) the worker for this target's BranchKey, then ask
    /// it to bootstrap the base folder. Idempotent by key; worker start
    /// failures propagate.
    pub async fn register_target(
        &self,
        target_id: &str,
        provider_namespace: &str,
        provider_name: &str,
        branch: &str,
        base_folder: &str,
    ) -> Result<(), EngineError> {
        if !self.leader.is_leader() {
            return Err(EngineError::NotLeader);
        }
        let key = BranchKey::new(provider_namespace, provider_name, branch);
        self.targets.lock().insert(
            target_id.to_string(),
            RegisteredTarget { key: key.clone(), base_folder: base_folder.to_string() },
        );

        let tx = {
            let _guard = self.spawn_lock.lock().await;
            let existing = self.workers.read().get(&key).map(|handle| handle.tx.clone());
            match existing {
                Some(tx) => tx,
                None => self.spawn_worker(key.clone()).await?,
            }
        };

        if tx
            .send(WorkerCommand::Bootstrap { base_folder: base_folder.to_string() })
            .await
            .is_err()
        {
            tracing::warn!(branch = %key, "worker inbox closed before bootstrap");
        }
        Ok(())
    }

    /// Stop and remove the worker for this target's BranchKey.
    ///
    /// Stops on any target's departure; per-key reference counting is a
    /// known refinement (the target table already records what it needs).
    pub async fn unregister_target(
        &self,
        target_id: &str,
        provider_namespace: &str,
        provider_name: &str,
        branch: &str,
    ) {
        let key = BranchKey::new(provider_namespace, provider_name, branch);
        self.targets.lock().remove(target_id);
        self.stop_worker(&key).await;
    }

    /// Stop workers whose key is no longer required by any target. Run
    /// periodically and on controller catch-up; failures are logged per
    /// key so one bad worker never blocks the rest.
    pub async fn reconcile(&self) {
        let required: HashSet<BranchKey> =
            self.targets.lock().values().map(|t| t.key.clone()).collect();
        let stale: Vec<BranchKey> = self
            .workers
            .read()
            .keys()
            .filter(|key| !required.contains(*key))
            .cloned()
            .collect();
        for key in stale {
            tracing::info!(branch = %key, "reconcile: stopping unneeded worker");
            self.stop_worker(&key).await;
        }
    }

    /// Number of live workers (test and status surfaces).
    pub fn worker_count(&self) -> usize {
        self.workers.read().len()
    }

    async fn spawn_worker(
        &self,
        key: BranchKey,
    ) -> Result<mpsc::Sender<WorkerCommand>, EngineError> {
        let lifetime = self.lifetime.lock().clone().ok_or(EngineError::NotStarted)?;

        let config =
            self.provider.resolve(&key.provider_namespace, &key.provider_name).await?;
        let ctx = WorkerContext {
            key: key.clone(),
            config,
            state_root: self.state_root.clone(),
            metrics: self.metrics.clone(),
        };
        let worker = BranchWorker::initialize(ctx, self.clock.clone()).await?;

        let (tx, rx) = mpsc::channel(WORKER_INBOX_CAPACITY);
        let cancel = lifetime.child_token();
        let join = tokio::spawn(worker.run(rx, cancel.clone()));
        self.workers
            .write()
            .insert(key, WorkerHandle { tx: tx.clone(), cancel, join });
        Ok(tx)
    }

    /// Drop a target record without stopping its worker, simulating the
    /// drift reconcile exists to repair.
    #[cfg(test)]
    pub(crate) fn forget_target(&self, target_id: &str) {
        self.targets.lock().remove(target_id);
    }

    async fn stop_worker(&self, key: &BranchKey) {
        let handle = self.workers.write().remove(key);
        let Some(handle) = handle else { return };
        handle.cancel.cancel();
        if let Err(e) = handle.join.await {
            tracing::warn!(branch = %key, error = %e, "worker task join failed");
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
