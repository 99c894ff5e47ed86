// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The human actor behind an event.
//!
//! Commits are authored by the system identity; the human appears only in
//! the commit message.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
}

impl UserInfo {
    pub fn new(username: impl Into<String>) -> Self {
        Self { username: username.into() }
    }
}

impl Default for UserInfo {
    fn default() -> Self {
        Self { username: "system".to_string() }
    }
}
