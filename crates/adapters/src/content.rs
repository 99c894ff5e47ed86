// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic serialization and the Secret encryption gate.
//!
//! The writer turns an observed object into the exact bytes that land in
//! the tree: canonical YAML for ordinary resources, ciphertext for
//! Secret-kind resources. Byte-stability matters: the commit engine
//! compares output against the file on disk to suppress no-op commits.
//!
//! Each worker owns its writer; the encryption cache is never shared
//! across workers.

use crate::encrypt::{EncryptError, EncryptMeta, Encryptor};
use gr_core::{Event, ResourceIdentifier};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use serde_yaml::value::Value as YamlValue;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Top-level keys emitted before everything else, in this order. Remaining
/// keys follow alphabetically.
const TOP_LEVEL_ORDER: &[&str] = &["apiVersion", "kind", "metadata", "spec", "data"];

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("event for {0} carries no object")]
    MissingObject(ResourceIdentifier),

    #[error("resource {0} requires encryption but no encryptor is configured")]
    EncryptionRequired(ResourceIdentifier),

    #[error("encryption failed for {identifier}: {source}")]
    EncryptionFailed {
        identifier: ResourceIdentifier,
        #[source]
        source: EncryptError,
    },

    #[error("serialization failed: {0}")]
    Serialize(String),
}

/// Identifies one encryption result; a change in any component (new
/// lineage via `uid`, new observation, new encryptor) forces a fresh call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheMarker {
    uid: String,
    resource_version: String,
    generation: i64,
    encryptor_version: String,
}

type SecretPredicate = dyn Fn(&ResourceIdentifier) -> bool + Send + Sync;

/// Per-worker content writer.
pub struct ContentWriter {
    encryptor: Option<Arc<dyn Encryptor>>,
    secret_predicate: Option<Box<SecretPredicate>>,
    cache: Mutex<HashMap<CacheMarker, Vec<u8>>>,
}

impl ContentWriter {
    pub fn new(encryptor: Option<Arc<dyn Encryptor>>) -> Self {
        Self { encryptor, secret_predicate: None, cache: Mutex::new(HashMap::new()) }
    }

    /// Plaintext-only writer; Secret-kind events fail with
    /// [`ContentError::EncryptionRequired`].
    pub fn plaintext() -> Self {
        Self::new(None)
    }

    /// Extend the encryption predicate beyond core-group Secrets.
    pub fn with_secret_predicate(
        mut self,
        predicate: impl Fn(&ResourceIdentifier) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.secret_predicate = Some(Box::new(predicate));
        self
    }

    pub fn encryption_active(&self) -> bool {
        self.encryptor.is_some()
    }

    /// Recipients of the active encryptor, for bootstrap templates.
    pub fn recipients(&self) -> &[String] {
        self.encryptor.as_deref().map(Encryptor::recipients).unwrap_or(&[])
    }

    /// Whether this identifier must never be written as plaintext.
    pub fn requires_encryption(&self, id: &ResourceIdentifier) -> bool {
        if id.is_core_group() && id.resource == "secrets" {
            return true;
        }
        self.secret_predicate.as_ref().is_some_and(|p| p(id))
    }

    /// Produce the exact bytes for this event's target file.
    ///
    /// On any error nothing has been written anywhere; in particular a
    /// failed or missing encryptor never leaks plaintext.
    pub async fn render(&self, event: &Event) -> Result<Vec<u8>, ContentError> {
        let object = event
            .object
            .as_ref()
            .ok_or_else(|| ContentError::MissingObject(event.identifier.clone()))?;
        let value = serde_json::to_value(object)
            .map_err(|e| ContentError::Serialize(e.to_string()))?;
        let yaml = canonical_yaml(&value)?;

        if !self.requires_encryption(&event.identifier) {
            return Ok(yaml.into_bytes());
        }
        let Some(encryptor) = &self.encryptor else {
            return Err(ContentError::EncryptionRequired(event.identifier.clone()));
        };

        let marker = CacheMarker {
            uid: event.uid().unwrap_or_default().to_string(),
            resource_version: event.resource_version().unwrap_or_default().to_string(),
            generation: event.generation().unwrap_or_default(),
            encryptor_version: encryptor.version().to_string(),
        };
        if let Some(hit) = self.cache.lock().get(&marker) {
            return Ok(hit.clone());
        }

        let meta = EncryptMeta { identifier: &event.identifier };
        let ciphertext = encryptor.encrypt(yaml.as_bytes(), &meta).await.map_err(|source| {
            ContentError::EncryptionFailed { identifier: event.identifier.clone(), source }
        })?;
        self.cache.lock().insert(marker, ciphertext.clone());
        Ok(ciphertext)
    }
}

/// Serialize to YAML with a canonical key order: the well-known manifest
/// keys first, everything else alphabetically, nested maps alphabetically.
/// Byte-stable for equal inputs.
pub fn canonical_yaml(value: &JsonValue) -> Result<String, ContentError> {
    let ordered = order_top_level(value);
    serde_yaml::to_string(&ordered).map_err(|e| ContentError::Serialize(e.to_string()))
}

fn order_top_level(value: &JsonValue) -> YamlValue {
    let JsonValue::Object(map) = value else {
        return to_yaml(value);
    };
    let mut out = serde_yaml::Mapping::with_capacity(map.len());
    for key in TOP_LEVEL_ORDER {
        if let Some(v) = map.get(*key) {
            out.insert(YamlValue::String((*key).to_string()), to_yaml(v));
        }
    }
    for key in sorted_keys(map) {
        if !TOP_LEVEL_ORDER.contains(&key.as_str()) {
            if let Some(v) = map.get(key) {
                out.insert(YamlValue::String(key.clone()), to_yaml(v));
            }
        }
    }
    YamlValue::Mapping(out)
}

// Sort explicitly: serde_json's map order depends on a cargo feature other
// dependencies may toggle.
fn sorted_keys(map: &serde_json::Map<String, JsonValue>) -> Vec<&String> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    keys
}

fn to_yaml(value: &JsonValue) -> YamlValue {
    match value {
        JsonValue::Null => YamlValue::Null,
        JsonValue::Bool(b) => YamlValue::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                YamlValue::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                YamlValue::Number(u.into())
            } else {
                YamlValue::Number(n.as_f64().unwrap_or_default().into())
            }
        }
        JsonValue::String(s) => YamlValue::String(s.clone()),
        JsonValue::Array(items) => YamlValue::Sequence(items.iter().map(to_yaml).collect()),
        JsonValue::Object(map) => {
            let mut out = serde_yaml::Mapping::with_capacity(map.len());
            for key in sorted_keys(map) {
                if let Some(v) = map.get(key) {
                    out.insert(YamlValue::String(key.clone()), to_yaml(v));
                }
            }
            YamlValue::Mapping(out)
        }
    }
}

#[cfg(test)]
#[path = "content_tests.rs"]
mod tests;
