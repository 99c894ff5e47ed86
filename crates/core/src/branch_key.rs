// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Branch worker identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit of commit serialization: one worker (and one commit stream) per
/// `(provider, branch)`.
///
/// Two destinations sharing a key share a worker even when they write to
/// different base folders.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BranchKey {
    pub provider_namespace: String,
    pub provider_name: String,
    pub branch: String,
}

impl BranchKey {
    pub fn new(
        provider_namespace: impl Into<String>,
        provider_name: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            provider_namespace: provider_namespace.into(),
            provider_name: provider_name.into(),
            branch: branch.into(),
        }
    }
}

impl fmt::Display for BranchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.provider_namespace, self.provider_name, self.branch)
    }
}
