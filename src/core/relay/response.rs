//! Synthetic rejection response.
//!
//! Builds the plain HTTP reply written to clients whose first request was
//! denied. Assembled by hand; the relay carries no HTTP stack on the data
//! path.

use chrono::Utc;

const NOT_FOUND_BODY: &str = "404 page not found";
const SERVER_TOKEN: &str = concat!("portward/", env!("CARGO_PKG_VERSION"));

/// Builds the complete not-found reply, headers and body.
///
/// The `Date` header is RFC 1123 in GMT and `Content-Length` always matches
/// the fixed body, so the client can frame the response without waiting for
/// the close.
#[must_use]
pub fn not_found_response() -> Vec<u8> {
    let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
    format!(
        "HTTP/1.1 404 Not Found\r\n\
         Date: {date}\r\n\
         Server: {SERVER_TOKEN}\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {NOT_FOUND_BODY}",
        NOT_FOUND_BODY.len()
    )
    .into_bytes()
}
