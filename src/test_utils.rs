//! Test utilities and shared configuration.
//!
//! This module provides common helpers for unit and integration tests,
//! reducing duplication across the codebase.

#[cfg(any(test, feature = "testing"))]
use crate::config::{FilterMode, DEFAULT_DENIED_TARGETS};
#[cfg(any(test, feature = "testing"))]
use crate::core::relay::listener::RelayConfig;
#[cfg(any(test, feature = "testing"))]
use crate::core::relay::sniff::TargetPolicy;
#[cfg(any(test, feature = "testing"))]
use std::net::SocketAddr;

/// Creates a standard relay configuration for testing purposes.
///
/// This configuration has:
/// - Enforce mode with the built-in deny list
/// - A small concurrency limit
/// - No idle timeout and no stats
#[cfg(any(test, feature = "testing"))]
#[must_use]
pub fn create_test_config(listen_addr: SocketAddr, remote_addr: &str) -> RelayConfig {
    RelayConfig {
        listen_addr,
        remote_addr: remote_addr.to_string(),
        filter_mode: FilterMode::Enforce,
        policy: TargetPolicy::new(DEFAULT_DENIED_TARGETS.iter().map(ToString::to_string)),
        concurrency_limit: 64,
        idle_timeout: None,
        stats: None,
    }
}
