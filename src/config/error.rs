//! Error types and result alias.
//!
//! Defines the error enumeration shared across the relay and the
//! crate-wide `Result` alias.

use std::net::SocketAddr;
use thiserror::Error;

/// Errors surfaced by the relay.
///
/// `Listen` is fatal at startup; `Dial` terminates a single connection
/// pipeline; `Config` rejects bad input before anything runs.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// The listen address could not be bound.
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The fixed remote endpoint could not be dialed.
    #[error("failed to dial remote {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for `RelayError`.
pub type Result<T> = std::result::Result<T, RelayError>;
