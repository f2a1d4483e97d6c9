//! First-chunk request sniffing.
//!
//! Best-effort extraction of a request line and host header from the first
//! bytes of an inbound stream, plus the deny-list classification applied to
//! the result. Pure functions over a byte slice; the socket is never read
//! here.

use std::collections::HashSet;
use thiserror::Error;

/// Reasons a first chunk cannot be classified.
///
/// None of these end the connection; an unclassifiable chunk is simply
/// forwarded as-is.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SniffError {
    /// The chunk is not valid UTF-8.
    #[error("first chunk is not valid UTF-8")]
    NotText,

    /// No second line to read a host header from.
    #[error("first chunk has fewer than two lines")]
    MissingHostLine,

    /// The request line does not carry method, target, and protocol.
    #[error("request line has fewer than three tokens")]
    MalformedRequestLine,

    /// The second line has no name/value separator.
    #[error("host line has no ': ' separator")]
    MalformedHostLine,
}

/// Request shape pulled out of a first chunk.
///
/// Borrows from the sniff buffer; it lives only for the intake step and is
/// dropped before the relay starts.
#[derive(Debug, PartialEq, Eq)]
pub struct RequestDescriptor<'a> {
    pub method: &'a str,
    pub target: &'a str,
    pub protocol: &'a str,
    pub host: &'a str,
}

/// Splits a first chunk into a [`RequestDescriptor`].
///
/// Lines are taken positionally on `\r\n`: the first must carry at least
/// `METHOD TARGET PROTOCOL` (extra tokens are ignored, empty tokens from
/// doubled spaces are kept), and the second is treated as the host header
/// whatever its name, with everything after the first `": "` as the value.
///
/// # Errors
///
/// Returns a [`SniffError`] for undersized or non-textual input instead of
/// indexing past the end of the chunk.
pub fn parse_request(chunk: &[u8]) -> Result<RequestDescriptor<'_>, SniffError> {
    let text = std::str::from_utf8(chunk).map_err(|_| SniffError::NotText)?;

    let mut lines = text.split("\r\n");
    let request_line = lines.next().unwrap_or("");
    let host_line = lines.next().ok_or(SniffError::MissingHostLine)?;

    let mut tokens = request_line.split(' ');
    let (Some(method), Some(target), Some(protocol)) =
        (tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(SniffError::MalformedRequestLine);
    };

    let (_, host) = host_line
        .split_once(": ")
        .ok_or(SniffError::MalformedHostLine)?;

    Ok(RequestDescriptor {
        method,
        target,
        protocol,
        host,
    })
}

/// Classification verdict for a sniffed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
}

/// Exact-match deny list over request targets.
///
/// Deliberately primitive: membership in the set means deny, anything else
/// means allow. Substring and pattern matching are out of scope.
#[derive(Debug, Clone)]
pub struct TargetPolicy {
    denied_targets: HashSet<String>,
}

impl TargetPolicy {
    #[must_use]
    pub fn new<I>(denied_targets: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            denied_targets: denied_targets.into_iter().collect(),
        }
    }

    /// Classifies a sniffed request by its exact target string.
    #[must_use]
    pub fn classify(&self, request: &RequestDescriptor<'_>) -> Verdict {
        if self.denied_targets.contains(request.target) {
            Verdict::Deny
        } else {
            Verdict::Allow
        }
    }
}
