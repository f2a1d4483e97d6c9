//! Configuration settings.
//!
//! Defines the immutable `Config` struct assembled once at startup by the
//! CLI layer, plus the small parsing helpers it needs.

use super::error::RelayError;
use std::net::SocketAddr;
use std::time::Duration;

/// How a deny verdict from the sniffer is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Denied requests get the synthetic not-found reply and are closed
    /// without ever reaching the remote.
    Enforce,
    /// Verdicts are logged only; every connection is relayed.
    Observe,
}

impl FilterMode {
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "OBSERVE" => Self::Observe,
            _ => Self::Enforce,
        }
    }
}

/// Request targets denied when no explicit deny list is configured.
pub const DEFAULT_DENIED_TARGETS: &[&str] = &["/?c=index&a=info"];

/// Default cap on concurrently served inbound connections.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 1024;

/// Default port for the debug/stats endpoint.
pub const DEFAULT_DEBUG_PORT: u16 = 6060;

/// Application configuration, immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the relay listens on.
    pub listen_addr: SocketAddr,
    /// Fixed `host:port` every inbound connection is forwarded to.
    pub remote_addr: String,
    /// Address of the debug/stats endpoint.
    pub debug_addr: SocketAddr,
    /// How deny verdicts are applied.
    pub filter_mode: FilterMode,
    /// Exact-match request targets to deny.
    pub denied_targets: Vec<String>,
    /// Maximum concurrently served inbound connections.
    pub concurrency_limit: usize,
    /// Optional per-read deadline on relay directions. `None` means the
    /// relay waits forever, like the remote it fronts.
    pub idle_timeout: Option<Duration>,
}

impl Config {
    /// Creates a configuration with defaults for everything except the two
    /// addresses the relay cannot run without.
    #[must_use]
    pub fn new(listen_addr: SocketAddr, remote_addr: impl Into<String>) -> Self {
        Self {
            listen_addr,
            remote_addr: remote_addr.into(),
            debug_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_DEBUG_PORT)),
            filter_mode: FilterMode::Enforce,
            denied_targets: DEFAULT_DENIED_TARGETS
                .iter()
                .map(ToString::to_string)
                .collect(),
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            idle_timeout: None,
        }
    }
}

/// Validates a `host:port` string for the remote endpoint.
///
/// Accepts hostnames as well as IP literals; only the port is parsed.
///
/// # Errors
///
/// Returns `RelayError::Config` when the separator is missing, the host
/// part is empty, or the port is not a valid u16.
pub fn parse_host_port(s: &str) -> Result<String, RelayError> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| RelayError::Config(format!("remote must be host:port, got '{s}'")))?;
    if host.is_empty() {
        return Err(RelayError::Config(format!("remote host is empty in '{s}'")));
    }
    if port.parse::<u16>().is_err() {
        return Err(RelayError::Config(format!(
            "remote port is not a valid u16 in '{s}'"
        )));
    }
    Ok(s.to_string())
}
