// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stateless event routing.
//!
//! Producers hand the router an event plus the provider/branch it applies
//! to; the router looks up the responsible worker under the registry's
//! reader lock and enqueues. The send awaits outside the lock, so a slow
//! worker backpressures its producers, not the whole registry.

use crate::registry::WorkerTable;
use crate::worker::WorkerCommand;
use gr_core::{BranchKey, Event};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteError {
    /// The destination has not been registered (or its worker stopped).
    /// The only error surfaced synchronously to producers.
    #[error("no worker registered for {0}")]
    NoWorker(BranchKey),
}

#[derive(Clone)]
pub struct EventRouter {
    workers: Arc<WorkerTable>,
}

impl EventRouter {
    pub(crate) fn new(workers: Arc<WorkerTable>) -> Self {
        Self { workers }
    }

    pub async fn route(
        &self,
        provider_namespace: &str,
        provider_name: &str,
        branch: &str,
        event: Event,
    ) -> Result<(), RouteError> {
        let key = BranchKey::new(provider_namespace, provider_name, branch);
        let tx = self.workers.read().get(&key).map(|handle| handle.tx.clone());
        match tx {
            Some(tx) => tx
                .send(WorkerCommand::Deliver(event))
                .await
                .map_err(|_| RouteError::NoWorker(key)),
            None => Err(RouteError::NoWorker(key)),
        }
    }
}
