// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Encryption adapter for Secret-kind resources.
//!
//! The engine never links an encryption implementation; it talks to the
//! [`Encryptor`] trait. The shipped implementation shells out to `sops`,
//! piping plaintext over stdin and reading ciphertext from stdout. Identity
//! material is materialized to a mode-0600 key file inside a per-worker
//! working directory and removed on shutdown; plaintext never touches disk.

use async_trait::async_trait;
use gr_core::ResourceIdentifier;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Env var the external tool reads to locate the age key file.
const AGE_KEY_FILE_ENV: &str = "SOPS_AGE_KEY_FILE";

/// Prefix of an age identity entry in the encryption secret.
const AGE_IDENTITY_PREFIX: &str = "AGE-SECRET-KEY-";

/// Prefix of an inline age recipient (public key).
const AGE_RECIPIENT_PREFIX: &str = "age1";

#[derive(Debug, Error)]
pub enum EncryptError {
    #[error("encryption secret entry {0:?} is not a valid environment variable name")]
    BadEnvName(String),

    #[error("encryption secret entry {0:?} is not valid UTF-8")]
    NotUtf8(String),

    #[error("encryption secret carries no identities, recipients or settings")]
    NoRecipients,

    #[error("failed to materialize encryption working directory: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("failed to spawn encryptor {binary:?}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("encryptor exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("encryptor produced no output")]
    EmptyOutput,

    #[error("encryptor timed out after {0:?}")]
    TimedOut(Duration),

    #[error("encryptor I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-resource context passed to the encryptor.
pub struct EncryptMeta<'a> {
    pub identifier: &'a ResourceIdentifier,
}

impl EncryptMeta<'_> {
    /// Synthetic filename hint so path-scoped encryption rules apply even
    /// though the plaintext arrives over stdin.
    pub fn filename_hint(&self) -> String {
        match &self.identifier.namespace {
            Some(ns) => format!("{}_{}_{}.yaml", self.identifier.resource, ns, self.identifier.name),
            None => format!("{}_{}.yaml", self.identifier.resource, self.identifier.name),
        }
    }
}

/// A function from plaintext bytes (plus resource metadata) to ciphertext.
///
/// Implementations must guarantee that a failure leaves no plaintext behind
/// anywhere the caller could later commit.
#[async_trait]
pub trait Encryptor: Send + Sync {
    /// Version marker folded into the content writer's cache key; bump it
    /// and cached ciphertexts are re-encrypted.
    fn version(&self) -> &str;

    /// Recipients the active configuration encrypts to (for bootstrap
    /// templates). Empty when not applicable.
    fn recipients(&self) -> &[String] {
        &[]
    }

    async fn encrypt(
        &self,
        plaintext: &[u8],
        meta: &EncryptMeta<'_>,
    ) -> Result<Vec<u8>, EncryptError>;
}

/// Encryption settings resolved from an opaque encryption secret.
///
/// Entry names must be valid environment variable names; entries whose
/// value carries the age identity prefix become the key file, entries whose
/// value is an age public key become recipients, everything else is passed
/// to the tool's environment verbatim.
#[derive(Debug, Clone, Default)]
pub struct EncryptionConfig {
    pub env: Vec<(String, String)>,
    pub identities: Vec<String>,
    pub recipients: Vec<String>,
}

impl EncryptionConfig {
    pub fn from_secret_data(data: &BTreeMap<String, Vec<u8>>) -> Result<Self, EncryptError> {
        let mut config = Self::default();
        for (name, raw) in data {
            if !is_env_name(name) {
                return Err(EncryptError::BadEnvName(name.clone()));
            }
            let value = String::from_utf8(raw.clone())
                .map_err(|_| EncryptError::NotUtf8(name.clone()))?;
            let trimmed = value.trim();
            if trimmed.starts_with(AGE_IDENTITY_PREFIX) {
                config.identities.push(trimmed.to_string());
            } else if trimmed.starts_with(AGE_RECIPIENT_PREFIX) {
                config.recipients.push(trimmed.to_string());
            } else {
                config.env.push((name.clone(), value));
            }
        }
        Ok(config)
    }

    pub fn is_empty(&self) -> bool {
        self.env.is_empty() && self.identities.is_empty() && self.recipients.is_empty()
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else { return false };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Encryptor that shells out to the `sops` binary.
#[derive(Debug)]
pub struct SopsEncryptor {
    binary: PathBuf,
    work_dir: PathBuf,
    key_file: Option<PathBuf>,
    env: Vec<(String, String)>,
    recipients: Vec<String>,
    timeout: Duration,
}

impl SopsEncryptor {
    /// Prepare a per-worker encryptor: create the working directory and
    /// materialize identity material as a mode-0600 key file.
    pub async fn prepare(
        config: EncryptionConfig,
        work_dir: impl Into<PathBuf>,
    ) -> Result<Self, EncryptError> {
        // Recipients may also arrive through the tool's environment
        // (e.g. SOPS_AGE_RECIPIENTS); only a fully empty config is broken.
        if config.is_empty() {
            return Err(EncryptError::NoRecipients);
        }
        let work_dir = work_dir.into();
        tokio::fs::create_dir_all(&work_dir).await.map_err(EncryptError::Workspace)?;

        let key_file = if config.identities.is_empty() {
            None
        } else {
            let path = work_dir.join("age-keys.txt");
            write_private(&path, config.identities.join("\n").as_bytes()).await?;
            Some(path)
        };

        Ok(Self {
            binary: PathBuf::from("sops"),
            work_dir,
            key_file,
            env: config.env,
            recipients: config.recipients,
            timeout: Duration::from_secs(120),
        })
    }

    /// Override the binary path (tests point this at a stub script).
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Remove materialized key material. Called on worker shutdown.
    pub async fn cleanup(&self) {
        if let Some(key_file) = &self.key_file {
            if let Err(e) = tokio::fs::remove_file(key_file).await {
                tracing::debug!(path = %key_file.display(), error = %e, "key file cleanup failed");
            }
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.work_dir).await {
            tracing::debug!(path = %self.work_dir.display(), error = %e, "work dir cleanup failed");
        }
    }
}

#[async_trait]
impl Encryptor for SopsEncryptor {
    fn version(&self) -> &str {
        "sops-age-v1"
    }

    fn recipients(&self) -> &[String] {
        &self.recipients
    }

    async fn encrypt(
        &self,
        plaintext: &[u8],
        meta: &EncryptMeta<'_>,
    ) -> Result<Vec<u8>, EncryptError> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.arg("--encrypt")
            .args(["--input-type", "yaml", "--output-type", "yaml"])
            .args(["--filename-override", &meta.filename_hint()])
            .arg("/dev/stdin")
            .current_dir(&self.work_dir);
        if !self.recipients.is_empty() {
            cmd.args(["--age", &self.recipients.join(",")]);
        }
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
        for (name, value) in &self.env {
            cmd.env(name, value);
        }
        if let Some(key_file) = &self.key_file {
            cmd.env(AGE_KEY_FILE_ENV, key_file);
        }

        let mut child = cmd.spawn().map_err(|source| EncryptError::Spawn {
            binary: self.binary.display().to_string(),
            source,
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(plaintext).await?;
            stdin.shutdown().await?;
            drop(stdin);
        }

        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            () = tokio::time::sleep(self.timeout) => {
                return Err(EncryptError::TimedOut(self.timeout));
            }
        };

        if !output.status.success() {
            return Err(EncryptError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if output.stdout.is_empty() {
            return Err(EncryptError::EmptyOutput);
        }
        Ok(output.stdout)
    }
}

/// Write a file readable by the owner only.
async fn write_private(path: &Path, contents: &[u8]) -> Result<(), EncryptError> {
    tokio::fs::write(path, contents).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "encrypt_tests.rs"]
mod tests;
