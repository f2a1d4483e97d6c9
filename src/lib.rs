//! Library definitions.
//!
//! Exports the relay core, configuration, and the diagnostics endpoint.

pub mod config;
pub mod core;
pub mod debug;

#[cfg(any(test, feature = "testing"))]
pub mod test_utils;
pub use config::{Config, FilterMode, RelayError, Result};
pub use core::relay::listener::{run_relay_listener, RelayConfig};
pub use core::relay::session::{dial_remote, run_session, Direction};
pub use core::relay::sniff::{parse_request, RequestDescriptor, SniffError, TargetPolicy, Verdict};
pub use debug::{run_debug_listener, RelayStats, StatsSnapshot};
