// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-provider configuration resolution.
//!
//! Where the remote URL, credentials and encryption material come from
//! (custom resources, secret stores) is out of scope; the registry asks a
//! resolver and gets back everything a worker needs.

use crate::config::PushPolicy;
use crate::error::EngineError;
use async_trait::async_trait;
use gr_adapters::{EncryptionConfig, TransportAuth};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Everything needed to run one provider's branch workers.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub remote_url: String,
    pub auth: TransportAuth,
    /// `None` disables encryption; Secret-kind events then fail closed.
    pub encryption: Option<EncryptionConfig>,
    pub policy: PushPolicy,
}

#[async_trait]
pub trait ProviderResolver: Send + Sync + 'static {
    async fn resolve(&self, namespace: &str, name: &str) -> Result<ProviderConfig, EngineError>;
}

/// Fixed table of provider configurations; used by tests and single-tenant
/// deployments.
#[derive(Default)]
pub struct StaticResolver {
    providers: Mutex<HashMap<(String, String), ProviderConfig>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, namespace: &str, name: &str, config: ProviderConfig) {
        self.providers.lock().insert((namespace.to_string(), name.to_string()), config);
    }
}

#[async_trait]
impl ProviderResolver for StaticResolver {
    async fn resolve(&self, namespace: &str, name: &str) -> Result<ProviderConfig, EngineError> {
        self.providers
            .lock()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                EngineError::ConfigInvalid(format!("unknown provider {namespace}/{name}"))
            })
    }
}
