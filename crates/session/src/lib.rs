// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kong-session: the per-process orchestration session
//!
//! The session owns the current working folder and the driver cache, turns
//! user selectors (job ids, ranges, globs, folder paths) into job sets and
//! dispatches bulk lifecycle operations to the owning drivers.

pub mod notify;
mod select;
pub mod session;

pub use notify::{DesktopNotify, Notify, NotifyError, NoOpNotify};
pub use session::{always_confirm, Moved, Session, SessionError};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use notify::FakeNotify;
