// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Staleness filtering after conflict pulls.
//!
//! When a conflict forced a re-synchronization with the remote, a pending
//! event may describe an older observation than what is now in the tree.
//! Such events are dropped rather than allowed to roll a resource back.
//!
//! Resource versions are opaque strings cluster-side but integer-valued
//! monotonic tokens within one lineage, so they compare as integers when
//! both sides parse. Deletes always proceed.

use gr_core::{Event, Operation};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleVerdict {
    Keep,
    Drop,
}

/// Compare a pending event against the file currently in the refreshed
/// tree (`None` when the file does not exist).
pub fn evaluate(event: &Event, existing: Option<&[u8]>) -> StaleVerdict {
    if matches!(event.operation, Operation::Delete | Operation::SeedSync { .. }) {
        return StaleVerdict::Keep;
    }
    let Some(bytes) = existing else {
        return StaleVerdict::Keep;
    };
    // An unparseable file cannot prove the event stale; overwrite it.
    let Ok(doc) = serde_yaml::from_slice::<Value>(bytes) else {
        return StaleVerdict::Keep;
    };
    let meta = doc.get("metadata");

    let event_rv = event.resource_version().and_then(|rv| rv.parse::<i64>().ok());
    let file_rv = meta.and_then(|m| m.get("resourceVersion")).and_then(as_integer);
    if let (Some(event_rv), Some(file_rv)) = (event_rv, file_rv) {
        return if event_rv < file_rv { StaleVerdict::Drop } else { StaleVerdict::Keep };
    }

    // Inconclusive resourceVersion: fall back to generation, defaulting to
    // zero on missing or malformed values.
    let event_generation = event.generation().unwrap_or(0);
    let file_generation = meta.and_then(|m| m.get("generation")).and_then(as_integer).unwrap_or(0);
    if event_generation < file_generation {
        StaleVerdict::Drop
    } else {
        StaleVerdict::Keep
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
#[path = "stale_tests.rs"]
mod tests;
