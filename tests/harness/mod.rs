//! Test harness utilities for loopback server testing.
//!
//! This module provides a blocking WebSocket client, an event-recording
//! handler and polling helpers shared by the integration tests.

#![allow(dead_code)]

mod client;
mod recorder;

use std::thread;
use std::time::{Duration, Instant};

use netframe::Config;
use tracing_subscriber::EnvFilter;

pub use client::{SAMPLE_KEY, WsClient, upgrade_request};
pub use recorder::{Event, Events, Recorder};

/// How long any single wait in a test may take.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Install a fmt subscriber once per test binary. `RUST_LOG` overrides the
/// default `warn` filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(true)
        .with_thread_names(true)
        .with_test_writer()
        .try_init();
}

/// Loopback configuration with an OS-assigned port.
pub fn local_config() -> Config {
    Config::new().with_listen_addr("127.0.0.1:0")
}

/// Poll `condition` until it holds or [`TIMEOUT`] passes.
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
