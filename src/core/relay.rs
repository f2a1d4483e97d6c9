//! Relay engine.
//!
//! Accepts inbound connections, sniffs the first chunk, and forwards bytes
//! in both directions to a fixed remote endpoint.

pub mod listener;
pub mod response;
pub mod session;
pub mod sniff;

pub use listener::{run_relay_listener, RelayConfig};
