// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-worker batching and push configuration.

use std::time::Duration;

/// How a branch worker batches events and retries pushes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPolicy {
    /// Interval of the periodic push ticker.
    pub push_interval: Duration,
    /// Push shortly after the first event of a fresh batch, for latency.
    pub batch_latency: Duration,
    /// Push as soon as this many events are pending.
    pub max_batch: usize,
    /// Push/recovery attempts per cycle before giving up until the next.
    pub retry_limit: u32,
    /// Bound on the final flush during shutdown.
    pub drain_deadline: Duration,
}

impl PushPolicy {
    pub fn production() -> Self {
        Self {
            push_interval: Duration::from_secs(30),
            batch_latency: Duration::from_secs(2),
            max_batch: 100,
            retry_limit: 3,
            drain_deadline: Duration::from_secs(10),
        }
    }

    /// Tight bounds for tests.
    pub fn test_mode() -> Self {
        Self {
            push_interval: Duration::from_millis(100),
            batch_latency: Duration::from_millis(20),
            max_batch: 8,
            retry_limit: 3,
            drain_deadline: Duration::from_secs(1),
        }
    }

    /// Apply `GR_*` environment overrides.
    pub fn from_env(mut self) -> Self {
        if let Some(ms) = env_u64("GR_PUSH_INTERVAL_MS") {
            self.push_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("GR_BATCH_LATENCY_MS") {
            self.batch_latency = Duration::from_millis(ms);
        }
        if let Some(n) = env_u64("GR_MAX_BATCH") {
            self.max_batch = n as usize;
        }
        if let Some(n) = env_u64("GR_PUSH_RETRY_LIMIT") {
            self.retry_limit = n as u32;
        }
        self
    }
}

impl Default for PushPolicy {
    fn default() -> Self {
        Self::production()
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
