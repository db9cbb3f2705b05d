// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kong_core::NotifySpec;

fn config_with_notify(names: &[&str]) -> (tempfile::TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default_at(dir.path()).unwrap();
    config.notify = names
        .iter()
        .map(|name| NotifySpec {
            name: name.to_string(),
            options: Default::default(),
        })
        .collect();
    (dir, config)
}

#[test]
fn builds_known_providers_and_skips_unknown() {
    let (_dir, config) = config_with_notify(&["noop", "telegram", "noop"]);
    let notifiers = from_config(&config);
    assert_eq!(notifiers.len(), 2, "unknown provider was skipped");
}

#[test]
fn empty_config_builds_no_notifiers() {
    let (_dir, config) = config_with_notify(&[]);
    assert!(from_config(&config).is_empty());
}

#[tokio::test]
async fn noop_always_succeeds() {
    NoOpNotify.notify("title", "message").await.unwrap();
}

#[tokio::test]
async fn fake_records_calls_in_order() {
    let fake = FakeNotify::new();
    fake.notify("first", "a").await.unwrap();
    fake.notify("second", "b").await.unwrap();
    let calls = fake.calls.lock().clone();
    assert_eq!(
        calls,
        vec![
            ("first".to_string(), "a".to_string()),
            ("second".to_string(), "b".to_string())
        ]
    );
}
