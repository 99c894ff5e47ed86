// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bootstrap templates for a freshly managed subtree.
//!
//! When a destination points at an empty path the worker materializes a
//! small marker set before the first resource lands there, notably the
//! encryption configuration, so anyone cloning the repository can tell
//! which recipients Secrets are encrypted to.

use gr_adapters::ContentWriter;

/// Files to create in an empty managed subtree: `(file name, contents)`.
pub fn bootstrap_files(base_folder: &str, writer: &ContentWriter) -> Vec<(String, String)> {
    let mut files = vec![("README.md".to_string(), readme(base_folder))];
    if writer.encryption_active() && !writer.recipients().is_empty() {
        files.push((".sops.yaml".to_string(), sops_config(writer.recipients())));
    }
    files
}

fn readme(base_folder: &str) -> String {
    let shown = if base_folder.is_empty() { "/" } else { base_folder };
    format!(
        "# {shown}\n\nThis path is managed by GitOps Reverser. Files below mirror live\ncluster resources; manual edits will be overwritten.\n"
    )
}

/// Creation rules matching every manifest under the subtree, encrypting
/// the sensitive fields to the active recipients.
fn sops_config(recipients: &[String]) -> String {
    format!(
        "creation_rules:\n  - path_regex: .*\\.yaml$\n    encrypted_regex: ^(data|stringData)$\n    age: {}\n",
        recipients.join(",")
    )
}

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;
