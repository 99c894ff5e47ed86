// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource identifiers and the repository path convention.
//!
//! An identifier names one resource lineage in the cluster:
//! `{group, version, resource, namespace, name}`. The repository-relative
//! path is a derived attribute:
//!
//! ```text
//! core group, cluster-scoped:   <version>/<resource>/<name>.yaml
//! core group, namespaced:       <version>/<resource>/<namespace>/<name>.yaml
//! non-core,   cluster-scoped:   <group>/<version>/<resource>/<name>.yaml
//! non-core,   namespaced:       <group>/<version>/<resource>/<namespace>/<name>.yaml
//! ```
//!
//! Parsing round-trips the mapping; a version-like leading segment
//! disambiguates the four-segment case (core namespaced vs non-core
//! cluster-scoped).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors produced by path derivation, parsing and base-folder sanitizing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("identifier has an empty {0} component")]
    EmptyComponent(&'static str),

    #[error("identifier component {component} contains '/': {value:?}")]
    SlashInComponent { component: &'static str, value: String },

    #[error("path {0:?} does not follow the repository layout")]
    Unparseable(String),

    #[error("base folder {0:?} is not a relative forward-slash path")]
    InvalidBaseFolder(String),
}

/// Identity of one resource lineage: group/version/resource plus
/// namespace (`None` for cluster-scoped) and name.
///
/// Equality and ordering are defined on the tuple; the repository path is
/// derived via [`ResourceIdentifier::to_repo_path`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    /// API group; empty string for the core group.
    pub group: String,
    /// API version, e.g. `v1`.
    pub version: String,
    /// Lowercase plural resource, e.g. `pods`.
    pub resource: String,
    /// Namespace; `None` for cluster-scoped resources.
    pub namespace: Option<String>,
    /// Object name.
    pub name: String,
}

impl ResourceIdentifier {
    /// Cluster-scoped identifier in the given group.
    pub fn cluster(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
            namespace: None,
            name: name.into(),
        }
    }

    /// Namespaced identifier in the given group.
    pub fn namespaced(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn is_core_group(&self) -> bool {
        self.group.is_empty()
    }

    /// `group/version/resource` for commit messages; the core group drops
    /// the empty leading segment.
    pub fn api_path(&self) -> String {
        if self.is_core_group() {
            format!("{}/{}", self.version, self.resource)
        } else {
            format!("{}/{}/{}", self.group, self.version, self.resource)
        }
    }

    /// Repository-relative path for this identifier.
    ///
    /// Fails when a component is empty or contains `/`; such identifiers
    /// cannot round-trip and must never reach the worktree.
    pub fn to_repo_path(&self) -> Result<PathBuf, PathError> {
        check_component("version", &self.version)?;
        check_component("resource", &self.resource)?;
        check_component("name", &self.name)?;
        if !self.group.is_empty() && self.group.contains('/') {
            return Err(PathError::SlashInComponent {
                component: "group",
                value: self.group.clone(),
            });
        }
        if let Some(ns) = &self.namespace {
            check_component("namespace", ns)?;
        }

        let mut segments: Vec<&str> = Vec::with_capacity(5);
        if !self.group.is_empty() {
            segments.push(&self.group);
        }
        segments.push(&self.version);
        segments.push(&self.resource);
        if let Some(ns) = &self.namespace {
            segments.push(ns);
        }

        let mut path: PathBuf = segments.iter().collect();
        path.push(format!("{}.yaml", self.name));
        Ok(path)
    }

    /// Parse a repository-relative path back into an identifier.
    ///
    /// The four-segment case is ambiguous between core-namespaced and
    /// non-core cluster-scoped; the leading segment decides: a version-like
    /// segment (`v` followed by a digit) means core group.
    pub fn parse_repo_path(path: &str) -> Result<Self, PathError> {
        let unparseable = || PathError::Unparseable(path.to_string());

        let trimmed = path.strip_suffix(".yaml").ok_or_else(unparseable)?;
        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(unparseable());
        }

        match segments.as_slice() {
            [version, resource, name] => {
                Ok(Self::cluster("", *version, *resource, *name))
            }
            [first, second, third, name] => {
                if looks_like_version(first) {
                    Ok(Self::namespaced("", *first, *second, *third, *name))
                } else {
                    Ok(Self::cluster(*first, *second, *third, *name))
                }
            }
            [group, version, resource, namespace, name] => {
                Ok(Self::namespaced(*group, *version, *resource, *namespace, *name))
            }
            _ => Err(unparseable()),
        }
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.api_path(), ns, self.name),
            None => write!(f, "{}/{}", self.api_path(), self.name),
        }
    }
}

/// `v1`, `v2`, `v1beta1` and similar: a `v` followed by a digit.
fn looks_like_version(segment: &str) -> bool {
    let mut chars = segment.chars();
    chars.next() == Some('v') && chars.next().is_some_and(|c| c.is_ascii_digit())
}

fn check_component(component: &'static str, value: &str) -> Result<(), PathError> {
    if value.is_empty() {
        return Err(PathError::EmptyComponent(component));
    }
    if value.contains('/') {
        return Err(PathError::SlashInComponent { component, value: value.to_string() });
    }
    Ok(())
}

/// Validate a base-folder prefix and normalize it to a relative path.
///
/// Rejects absolute paths, backslashes and any `..`/`.` traversal; an empty
/// string denotes the repository root. Trailing slashes are tolerated.
pub fn sanitize_base_folder(base: &str) -> Result<PathBuf, PathError> {
    if base.is_empty() {
        return Ok(PathBuf::new());
    }
    let invalid = || PathError::InvalidBaseFolder(base.to_string());

    if base.contains('\\') || base.starts_with('/') {
        return Err(invalid());
    }
    let trimmed = base.trim_end_matches('/');
    if trimmed.is_empty() || trimmed.split('/').any(|s| s.is_empty()) {
        return Err(invalid());
    }
    let path = Path::new(trimmed);
    if !path.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(invalid());
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
#[path = "identifier_tests.rs"]
mod tests;
