// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn secret(entries: &[(&str, &str)]) -> BTreeMap<String, Vec<u8>> {
    entries.iter().map(|(k, v)| (k.to_string(), v.as_bytes().to_vec())).collect()
}

#[parameterized(
    plain = { "SOPS_KMS_ARN" },
    underscore = { "_private" },
    mixed = { "Var_2" },
)]
fn env_names_accepted(name: &str) {
    assert!(is_env_name(name));
}

#[parameterized(
    empty = { "" },
    leading_digit = { "1VAR" },
    dash = { "MY-VAR" },
    space = { "MY VAR" },
)]
fn env_names_rejected(name: &str) {
    assert!(!is_env_name(name));
}

#[test]
fn config_splits_identities_recipients_and_env() {
    let config = EncryptionConfig::from_secret_data(&secret(&[
        ("identity", "AGE-SECRET-KEY-1ABCDEF"),
        ("recipient", "age1qqqsomepublickey"),
        ("SOPS_AGE_RECIPIENTS_MODE", "strict"),
    ]))
    .unwrap();
    assert_eq!(config.identities, vec!["AGE-SECRET-KEY-1ABCDEF"]);
    assert_eq!(config.recipients, vec!["age1qqqsomepublickey"]);
    assert_eq!(config.env, vec![("SOPS_AGE_RECIPIENTS_MODE".to_string(), "strict".to_string())]);
}

#[test]
fn config_rejects_bad_env_name() {
    let err = EncryptionConfig::from_secret_data(&secret(&[("not-a-name", "x")])).unwrap_err();
    assert!(matches!(err, EncryptError::BadEnvName(_)));
}

#[test]
fn filename_hint_shapes() {
    let namespaced = gr_core::ResourceIdentifier::namespaced("", "v1", "secrets", "default", "bar");
    assert_eq!(EncryptMeta { identifier: &namespaced }.filename_hint(), "secrets_default_bar.yaml");

    let cluster = gr_core::ResourceIdentifier::cluster("", "v1", "secrets", "bar");
    assert_eq!(EncryptMeta { identifier: &cluster }.filename_hint(), "secrets_bar.yaml");
}

#[tokio::test]
async fn prepare_rejects_empty_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = EncryptionConfig::from_secret_data(&BTreeMap::new()).unwrap();
    let err = SopsEncryptor::prepare(config, dir.path().join("enc")).await.unwrap_err();
    assert!(matches!(err, EncryptError::NoRecipients));
}

#[tokio::test]
async fn prepare_materializes_private_key_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = EncryptionConfig::from_secret_data(&secret(&[
        ("identity", "AGE-SECRET-KEY-1ABCDEF"),
        ("recipient", "age1qqqsomepublickey"),
    ]))
    .unwrap();
    let enc = SopsEncryptor::prepare(config, dir.path().join("enc")).await.unwrap();
    let key_file = enc.work_dir().join("age-keys.txt");
    let contents = std::fs::read_to_string(&key_file).unwrap();
    assert_eq!(contents, "AGE-SECRET-KEY-1ABCDEF");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&key_file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    enc.cleanup().await;
    assert!(!key_file.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn encrypt_pipes_through_external_binary() {
    use std::os::unix::fs::PermissionsExt;

    // Stub binary that frames stdin so the test can assert both directions
    // of the pipe without a real sops install.
    let dir = tempfile::tempdir().unwrap();
    let stub = dir.path().join("fake-sops");
    std::fs::write(&stub, "#!/bin/sh\nprintf 'ENC['\ncat -\nprintf ']'\n").unwrap();
    std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = EncryptionConfig {
        env: vec![],
        identities: vec![],
        recipients: vec!["age1qqqsomepublickey".to_string()],
    };
    let enc = SopsEncryptor::prepare(config, dir.path().join("enc"))
        .await
        .unwrap()
        .with_binary(&stub);

    let id = gr_core::ResourceIdentifier::namespaced("", "v1", "secrets", "default", "bar");
    let out = enc.encrypt(b"password: plain\n", &EncryptMeta { identifier: &id }).await.unwrap();
    assert_eq!(out, b"ENC[password: plain\n]");
}

#[cfg(unix)]
#[tokio::test]
async fn encrypt_failure_reports_stderr() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let stub = dir.path().join("fake-sops");
    std::fs::write(&stub, "#!/bin/sh\necho 'no key' >&2\nexit 3\n").unwrap();
    std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = EncryptionConfig {
        env: vec![],
        identities: vec![],
        recipients: vec!["age1qqqsomepublickey".to_string()],
    };
    let enc = SopsEncryptor::prepare(config, dir.path().join("enc"))
        .await
        .unwrap()
        .with_binary(&stub);

    let id = gr_core::ResourceIdentifier::namespaced("", "v1", "secrets", "default", "bar");
    let err = enc.encrypt(b"x: y\n", &EncryptMeta { identifier: &id }).await.unwrap_err();
    match err {
        EncryptError::Failed { stderr, .. } => assert_eq!(stderr, "no key"),
        other => panic!("expected Failed, got {other:?}"),
    }
}
