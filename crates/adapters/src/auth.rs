// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport authentication resolved from opaque secret material.
//!
//! The credential source (secret store, file) is out of scope; callers hand
//! over the raw key/value data and get back something that can drive a git
//! transport. Resolution order:
//!
//! ```text
//! 1. `ssh-privatekey` present          → SSH key auth
//!    (`ssh-password`, `known_hosts` optional)
//! 2. `username` + `password` present   → HTTP basic auth
//! 3. nothing present                   → anonymous (public repository)
//! ```

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("secret entry {0:?} is not valid UTF-8")]
    NotUtf8(&'static str),

    #[error("secret has {present:?} but is missing {missing:?}")]
    IncompleteBasic { present: &'static str, missing: &'static str },
}

/// Resolved transport authentication.
#[derive(Clone)]
pub enum TransportAuth {
    Ssh {
        private_key: String,
        passphrase: Option<String>,
        known_hosts: Option<String>,
    },
    Basic {
        username: String,
        password: String,
    },
    Anonymous,
}

impl std::fmt::Debug for TransportAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log key material.
        match self {
            TransportAuth::Ssh { .. } => f.write_str("TransportAuth::Ssh"),
            TransportAuth::Basic { username, .. } => {
                write!(f, "TransportAuth::Basic({username})")
            }
            TransportAuth::Anonymous => f.write_str("TransportAuth::Anonymous"),
        }
    }
}

impl TransportAuth {
    /// Resolve from the data map of a credentials secret.
    pub fn from_secret_data(data: &BTreeMap<String, Vec<u8>>) -> Result<Self, AuthError> {
        if let Some(key) = data.get("ssh-privatekey") {
            let private_key =
                String::from_utf8(key.clone()).map_err(|_| AuthError::NotUtf8("ssh-privatekey"))?;
            let passphrase = optional_utf8(data, "ssh-password")?;
            let known_hosts = optional_utf8(data, "known_hosts")?;
            return Ok(TransportAuth::Ssh { private_key, passphrase, known_hosts });
        }

        match (data.get("username"), data.get("password")) {
            (Some(user), Some(pass)) => {
                let username =
                    String::from_utf8(user.clone()).map_err(|_| AuthError::NotUtf8("username"))?;
                let password =
                    String::from_utf8(pass.clone()).map_err(|_| AuthError::NotUtf8("password"))?;
                Ok(TransportAuth::Basic { username, password })
            }
            (Some(_), None) => {
                Err(AuthError::IncompleteBasic { present: "username", missing: "password" })
            }
            (None, Some(_)) => {
                Err(AuthError::IncompleteBasic { present: "password", missing: "username" })
            }
            (None, None) => Ok(TransportAuth::Anonymous),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, TransportAuth::Anonymous)
    }

    /// The `known_hosts` material carried by an SSH credential, if any.
    /// The worker materializes it next to its working directory.
    pub fn known_hosts(&self) -> Option<&str> {
        match self {
            TransportAuth::Ssh { known_hosts, .. } => known_hosts.as_deref(),
            _ => None,
        }
    }

    /// Remote callbacks wired with a credentials closure for this auth.
    pub fn callbacks(&self) -> git2::RemoteCallbacks<'_> {
        let mut callbacks = git2::RemoteCallbacks::new();
        match self {
            TransportAuth::Ssh { private_key, passphrase, .. } => {
                callbacks.credentials(move |_url, username_from_url, _allowed| {
                    git2::Cred::ssh_key_from_memory(
                        username_from_url.unwrap_or("git"),
                        None,
                        private_key,
                        passphrase.as_deref(),
                    )
                });
            }
            TransportAuth::Basic { username, password } => {
                callbacks.credentials(move |_url, _username_from_url, _allowed| {
                    git2::Cred::userpass_plaintext(username, password)
                });
            }
            TransportAuth::Anonymous => {
                callbacks.credentials(|_url, username_from_url, _allowed| {
                    git2::Cred::default()
                        .or_else(|_| git2::Cred::username(username_from_url.unwrap_or("git")))
                });
            }
        }
        callbacks
    }
}

fn optional_utf8(
    data: &BTreeMap<String, Vec<u8>>,
    key: &'static str,
) -> Result<Option<String>, AuthError> {
    match data.get(key) {
        None => Ok(None),
        Some(bytes) => String::from_utf8(bytes.clone())
            .map(Some)
            .map_err(|_| AuthError::NotUtf8(key)),
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
