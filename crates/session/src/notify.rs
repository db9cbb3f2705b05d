// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification adapters.
//!
//! The session announces long-running outcomes (wait completion, wait
//! timeout) through this seam. Only the desktop transport is built in;
//! other providers are configuration that a future transport can pick up.

use async_trait::async_trait;
use kong_core::Config;
use std::sync::Arc;
use thiserror::Error;

/// Errors from notify operations
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Adapter for sending notifications
#[async_trait]
pub trait Notify: Send + Sync {
    /// Send a notification with a title and message body
    async fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError>;
}

/// Desktop notifications via the freedesktop/macOS notification services.
#[derive(Debug, Default, Clone)]
pub struct DesktopNotify;

#[async_trait]
impl Notify for DesktopNotify {
    async fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError> {
        notify_rust::Notification::new()
            .summary(title)
            .body(message)
            .show()
            .map(|_| ())
            .map_err(|e| NotifyError::SendFailed(e.to_string()))
    }
}

/// Notifier that drops everything.
#[derive(Debug, Default, Clone)]
pub struct NoOpNotify;

#[async_trait]
impl Notify for NoOpNotify {
    async fn notify(&self, _title: &str, _message: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Build the notifier set from the `notify` config list. Unknown provider
/// names are logged and skipped.
pub fn from_config(config: &Config) -> Vec<Arc<dyn Notify>> {
    let mut notifiers: Vec<Arc<dyn Notify>> = Vec::new();
    for spec in &config.notify {
        match spec.name.as_str() {
            "desktop" => notifiers.push(Arc::new(DesktopNotify)),
            "noop" => notifiers.push(Arc::new(NoOpNotify)),
            other => {
                tracing::warn!(provider = other, "unknown notify provider, skipping");
            }
        }
    }
    notifiers
}

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeNotify;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;

    /// Notifier that records every call.
    #[derive(Default)]
    pub struct FakeNotify {
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeNotify {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl Notify for FakeNotify {
        async fn notify(&self, title: &str, message: &str) -> Result<(), NotifyError> {
            self.calls.lock().push((title.to_string(), message.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
