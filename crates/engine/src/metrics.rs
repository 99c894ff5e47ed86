// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine counters surfaced to the observability layer.
//!
//! The exporters themselves are out of scope; the engine only maintains the
//! counters and hands out snapshots.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineMetrics {
    events_received: AtomicU64,
    events_processed: AtomicU64,
    events_dropped_stale: AtomicU64,
    commits_created: AtomicU64,
    pushes: AtomicU64,
    push_conflicts: AtomicU64,
    queue_depth: AtomicU64,
    last_push_ms: AtomicU64,
}

/// Point-in-time copy of the counters, shared with status surfaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub events_processed: u64,
    pub events_dropped_stale: u64,
    pub commits_created: u64,
    pub pushes: u64,
    pub push_conflicts: u64,
    pub queue_depth: u64,
    pub last_push_ms: u64,
}

impl EngineMetrics {
    pub fn event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_dropped_stale(&self) {
        self.events_dropped_stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn commit_created(&self) {
        self.commits_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn push_succeeded(&self, elapsed_ms: u64) {
        self.pushes.fetch_add(1, Ordering::Relaxed);
        self.last_push_ms.store(elapsed_ms, Ordering::Relaxed);
    }

    pub fn push_conflict(&self) {
        self.push_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_queue_depth(&self, depth: u64) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_dropped_stale: self.events_dropped_stale.load(Ordering::Relaxed),
            commits_created: self.commits_created.load(Ordering::Relaxed),
            pushes: self.pushes.load(Ordering::Relaxed),
            push_conflicts: self.push_conflicts.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            last_push_ms: self.last_push_ms.load(Ordering::Relaxed),
        }
    }
}
