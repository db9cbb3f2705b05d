// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    created   = { JobStatus::Created, 0, false },
    submitted = { JobStatus::Submitted, 1, false },
    running   = { JobStatus::Running, 2, false },
    failed    = { JobStatus::Failed, 3, true },
    completed = { JobStatus::Completed, 4, true },
    unknown   = { JobStatus::Unknown, 5, true },
)]
fn wire_values_and_terminality(status: JobStatus, wire: i64, terminal: bool) {
    assert_eq!(status.as_wire(), wire);
    assert_eq!(JobStatus::from_wire(wire), Some(status));
    assert_eq!(status.is_terminal(), terminal);
}

#[test]
fn from_wire_rejects_unknown_values() {
    assert_eq!(JobStatus::from_wire(6), None);
    assert_eq!(JobStatus::from_wire(-1), None);
}

#[test]
fn ordering_supports_submit_guard() {
    // Everything past CREATED must compare greater than CREATED.
    for status in JobStatus::ALL {
        if status != JobStatus::Created {
            assert!(status > JobStatus::Created, "{status} not > CREATED");
        }
    }
    assert!(JobStatus::Submitted < JobStatus::Running);
}

#[test]
fn live_statuses() {
    assert!(JobStatus::Submitted.is_live());
    assert!(JobStatus::Running.is_live());
    assert!(!JobStatus::Created.is_live());
    assert!(!JobStatus::Completed.is_live());
}

#[test]
fn display_matches_scheduler_vocabulary() {
    assert_eq!(JobStatus::Completed.to_string(), "COMPLETED");
    assert_eq!(JobStatus::Created.to_string(), "CREATED");
}
