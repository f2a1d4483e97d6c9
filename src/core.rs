//! Core system components.
//!
//! Contains the relay engine: listener, sniffer, and session plumbing.

pub mod relay;
