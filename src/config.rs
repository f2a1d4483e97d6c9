//! Configuration management.
//!
//! Immutable settings assembled by the CLI layer at startup, plus the
//! crate-wide error types.

mod error;
mod settings;

pub use error::{RelayError, Result};
pub use settings::{
    Config, FilterMode, parse_host_port, DEFAULT_CONCURRENCY_LIMIT, DEFAULT_DEBUG_PORT,
    DEFAULT_DENIED_TARGETS,
};
