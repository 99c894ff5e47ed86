// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use gr_core::{ResourceIdentifier, UserInfo};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use yare::parameterized;

fn update_event(rv: Option<&str>, generation: Option<i64>) -> Event {
    let object = DynamicObject {
        types: None,
        metadata: ObjectMeta {
            name: Some("foo".to_string()),
            namespace: Some("default".to_string()),
            uid: Some("uid-1".to_string()),
            resource_version: rv.map(str::to_string),
            generation,
            ..ObjectMeta::default()
        },
        data: serde_json::json!({}),
    };
    let id = ResourceIdentifier::namespaced("", "v1", "pods", "default", "foo");
    Event::update(object, id, UserInfo::new("alice"), "")
}

fn file(rv: &str, generation: Option<i64>) -> Vec<u8> {
    let generation_line =
        generation.map(|g| format!("  generation: {g}\n")).unwrap_or_default();
    format!("apiVersion: v1\nkind: Pod\nmetadata:\n  resourceVersion: '{rv}'\n{generation_line}")
        .into_bytes()
}

#[parameterized(
    older_is_dropped = { "300", "500", StaleVerdict::Drop },
    newer_is_kept = { "600", "500", StaleVerdict::Keep },
    equal_is_kept = { "500", "500", StaleVerdict::Keep },
)]
fn resource_version_comparison(event_rv: &str, file_rv: &str, expected: StaleVerdict) {
    let event = update_event(Some(event_rv), None);
    assert_eq!(evaluate(&event, Some(&file(file_rv, None))), expected);
}

#[test]
fn missing_file_keeps_event() {
    let event = update_event(Some("100"), None);
    assert_eq!(evaluate(&event, None), StaleVerdict::Keep);
}

#[test]
fn unparseable_file_keeps_event() {
    let event = update_event(Some("200"), None);
    assert_eq!(evaluate(&event, Some(b"invalid: yaml: {{{")), StaleVerdict::Keep);
}

#[test]
fn non_numeric_rv_falls_back_to_generation() {
    // File rv is not an integer → generation decides.
    let event = update_event(Some("not-a-number"), Some(2));
    let existing = b"metadata:\n  resourceVersion: abc\n  generation: 5\n";
    assert_eq!(evaluate(&event, Some(existing.as_slice())), StaleVerdict::Drop);

    let event = update_event(Some("not-a-number"), Some(7));
    assert_eq!(evaluate(&event, Some(existing.as_slice())), StaleVerdict::Keep);
}

#[test]
fn missing_generation_defaults_to_zero() {
    // Neither side has a usable rv; event has no generation either.
    let event = update_event(None, None);
    let existing = b"metadata:\n  name: foo\n";
    assert_eq!(evaluate(&event, Some(existing.as_slice())), StaleVerdict::Keep);
}

#[test]
fn numeric_yaml_rv_is_compared() {
    // resourceVersion written as a YAML integer rather than a string.
    let event = update_event(Some("3"), None);
    let existing = b"metadata:\n  resourceVersion: 9\n";
    assert_eq!(evaluate(&event, Some(existing.as_slice())), StaleVerdict::Drop);
}

#[test]
fn delete_always_proceeds() {
    let id = ResourceIdentifier::namespaced("", "v1", "pods", "default", "foo");
    let event = Event::delete(id, UserInfo::new("alice"), "");
    assert_eq!(evaluate(&event, Some(&file("999", None))), StaleVerdict::Keep);
}
