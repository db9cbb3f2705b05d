//! Shared fixtures for the behavioral specs.

use kong_drivers::WaitOptions;
use kong_session::Session;
use std::time::Duration;

pub use kong_drivers::test_support::{env, TestEnv};

pub fn session(env: &TestEnv) -> Session {
    Session::new(env.config.clone(), env.store.clone()).unwrap()
}

/// Wait options tuned for tests: tight polling, generous safety timeout.
pub fn quick_wait() -> WaitOptions {
    WaitOptions::default()
        .poll_interval(Duration::from_millis(50))
        .timeout(Duration::from_secs(60))
}
