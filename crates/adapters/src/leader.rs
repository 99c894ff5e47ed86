// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leader gate.
//!
//! Branch workers push to shared remote branches, so only the elected
//! leader may instantiate them. The election itself (lease, lock service)
//! is an external collaborator; the engine only consults the gate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub trait LeaderGate: Send + Sync {
    fn is_leader(&self) -> bool;
}

/// Gate that is always open, for single-replica deployments and tests.
#[derive(Debug, Clone, Default)]
pub struct AlwaysLeader;

impl LeaderGate for AlwaysLeader {
    fn is_leader(&self) -> bool {
        true
    }
}

/// Gate backed by a shared flag the election loop flips.
#[derive(Debug, Clone, Default)]
pub struct LeaderFlag {
    flag: Arc<AtomicBool>,
}

impl LeaderFlag {
    pub fn new(initial: bool) -> Self {
        Self { flag: Arc::new(AtomicBool::new(initial)) }
    }

    pub fn set(&self, leader: bool) {
        self.flag.store(leader, Ordering::SeqCst);
    }
}

impl LeaderGate for LeaderFlag {
    fn is_leader(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
