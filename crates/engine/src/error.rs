// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error kinds of the commit engine.
//!
//! Tagged variants, not a string soup: the worker's retry loop dispatches
//! on the kind. Push conflicts (`NonFastForward`, `RemoteWentMissing`,
//! `UnknownRemoteUpdates`) trigger conflict recovery; `Transient` retries
//! with bounded attempts; the rest are fatal for the event or the worker.

use gr_adapters::content::ContentError;
use gr_core::identifier::PathError;
use gr_core::ResourceIdentifier;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("resource {identifier} requires encryption but no encryptor is configured")]
    EncryptionRequired { identifier: ResourceIdentifier },

    #[error("encryption failed for {identifier}: {reason}")]
    EncryptionFailed { identifier: ResourceIdentifier, reason: String },

    #[error("remote branch advanced past the expected base")]
    NonFastForward,

    #[error("remote branch disappeared")]
    RemoteWentMissing,

    #[error("remote branch has unknown updates")]
    UnknownRemoteUpdates,

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("not the elected leader")]
    NotLeader,

    #[error("worker registry has not been started")]
    NotStarted,
}

impl EngineError {
    /// Conflict signals that trigger flex-pull recovery.
    pub fn is_push_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::NonFastForward
                | EngineError::RemoteWentMissing
                | EngineError::UnknownRemoteUpdates
        )
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }

    /// Fatal for the event only; the worker keeps running.
    pub fn is_event_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::EncryptionRequired { .. }
                | EngineError::EncryptionFailed { .. }
                | EngineError::ConfigInvalid(_)
        )
    }
}

impl From<git2::Error> for EngineError {
    fn from(e: git2::Error) -> Self {
        match e.code() {
            git2::ErrorCode::Auth => EngineError::AuthFailed(e.message().to_string()),
            git2::ErrorCode::NotFastForward => EngineError::NonFastForward,
            _ => EngineError::Transient(e.message().to_string()),
        }
    }
}

impl From<PathError> for EngineError {
    fn from(e: PathError) -> Self {
        EngineError::ConfigInvalid(e.to_string())
    }
}

impl From<ContentError> for EngineError {
    fn from(e: ContentError) -> Self {
        match e {
            ContentError::EncryptionRequired(identifier) => {
                EngineError::EncryptionRequired { identifier }
            }
            ContentError::EncryptionFailed { identifier, source } => {
                EngineError::EncryptionFailed { identifier, reason: source.to_string() }
            }
            other => EngineError::ConfigInvalid(other.to_string()),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Transient(e.to_string())
    }
}
