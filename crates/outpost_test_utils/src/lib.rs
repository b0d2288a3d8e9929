//! # Outpost Test Utilities
//!
//! Shared testing utilities for the workspace:
//! - Determinism test harness
//! - Fixture bases and helpers
//! - Property-based testing strategies
//! - Tracing setup for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a fmt subscriber filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
