// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource-change events consumed by branch workers.
//!
//! Events are produced by the ingress path (out of scope here), routed by
//! `BranchKey`, and applied to the worker's checkout in enqueue order. They
//! are immutable after enqueue.

use crate::identifier::ResourceIdentifier;
use crate::user::UserInfo;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// What happened to the resource.
///
/// `SeedSync` is a control operation: it carries no object and exists to
/// trigger orphan detection against the declared-live identifier set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Operation {
    #[serde(rename = "CREATE")]
    Create,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "SEED_SYNC")]
    SeedSync { live: BTreeSet<ResourceIdentifier> },
}

impl Operation {
    /// Uppercase label used in commit messages.
    pub fn label(&self) -> &'static str {
        match self {
            Operation::Create => "CREATE",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::SeedSync { .. } => "SEED_SYNC",
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, Operation::SeedSync { .. })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One observed mutation of a resource, bound for one branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// The observed object; `None` for `DELETE` and control events.
    pub object: Option<DynamicObject>,
    pub identifier: ResourceIdentifier,
    pub operation: Operation,
    pub user: UserInfo,
    /// Repository path prefix; empty means the repository root.
    pub base_folder: String,
}

impl Event {
    pub fn create(
        object: DynamicObject,
        identifier: ResourceIdentifier,
        user: UserInfo,
        base_folder: impl Into<String>,
    ) -> Self {
        Self {
            object: Some(object),
            identifier,
            operation: Operation::Create,
            user,
            base_folder: base_folder.into(),
        }
    }

    pub fn update(
        object: DynamicObject,
        identifier: ResourceIdentifier,
        user: UserInfo,
        base_folder: impl Into<String>,
    ) -> Self {
        Self {
            object: Some(object),
            identifier,
            operation: Operation::Update,
            user,
            base_folder: base_folder.into(),
        }
    }

    pub fn delete(
        identifier: ResourceIdentifier,
        user: UserInfo,
        base_folder: impl Into<String>,
    ) -> Self {
        Self {
            object: None,
            identifier,
            operation: Operation::Delete,
            user,
            base_folder: base_folder.into(),
        }
    }

    /// Control event triggering orphan detection for `base_folder`.
    pub fn seed_sync(
        live: BTreeSet<ResourceIdentifier>,
        user: UserInfo,
        base_folder: impl Into<String>,
    ) -> Self {
        Self {
            object: None,
            // The identifier of a control event is never written to disk;
            // a fixed marker keeps logs readable.
            identifier: ResourceIdentifier::cluster("", "v1", "seed-sync", "all"),
            operation: Operation::SeedSync { live },
            user,
            base_folder: base_folder.into(),
        }
    }

    /// Metadata of the carried object.
    pub fn metadata(&self) -> Option<&ObjectMeta> {
        self.object.as_ref().map(|o| &o.metadata)
    }

    /// `metadata.uid` of the carried object.
    pub fn uid(&self) -> Option<&str> {
        self.object.as_ref()?.metadata.uid.as_deref()
    }

    /// `metadata.resourceVersion` of the carried object.
    pub fn resource_version(&self) -> Option<&str> {
        self.object.as_ref()?.metadata.resource_version.as_deref()
    }

    /// `metadata.generation` of the carried object.
    pub fn generation(&self) -> Option<i64> {
        self.object.as_ref()?.metadata.generation
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
