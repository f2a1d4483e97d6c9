//! Debug endpoint and relay counters.
//!
//! Serves process diagnostics over plain HTTP on a side port. Lives next
//! to the relay, never on its data path; losing this listener costs
//! visibility, not traffic.

use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Best-effort relay counters.
///
/// All updates use relaxed ordering; the numbers are diagnostics, not
/// accounting.
#[derive(Debug, Default)]
pub struct RelayStats {
    connections_accepted: AtomicU64,
    requests_denied: AtomicU64,
    sniff_errors: AtomicU64,
    dial_failures: AtomicU64,
    active_sessions: AtomicU64,
    sessions_completed: AtomicU64,
    bytes_relayed: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Serialize)]
pub struct StatsSnapshot {
    pub connections_accepted: u64,
    pub requests_denied: u64,
    pub sniff_errors: u64,
    pub dial_failures: u64,
    pub active_sessions: u64,
    pub sessions_completed: u64,
    pub bytes_relayed: u64,
}

impl RelayStats {
    pub fn record_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_denied(&self) {
        self.requests_denied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sniff_error(&self) {
        self.sniff_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dial_failure(&self) {
        self.dial_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks a session finished. `relayed` carries the byte count of the
    /// direction that ended the session, when it ended cleanly.
    pub fn record_session_closed(&self, relayed: Option<u64>) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        self.sessions_completed.fetch_add(1, Ordering::Relaxed);
        if let Some(bytes) = relayed {
            self.bytes_relayed.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            requests_denied: self.requests_denied.load(Ordering::Relaxed),
            sniff_errors: self.sniff_errors.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            bytes_relayed: self.bytes_relayed.load(Ordering::Relaxed),
        }
    }
}

/// Runs the diagnostics endpoint.
///
/// Returns after logging a warning if the port cannot be bound; the relay
/// keeps running without diagnostics.
pub async fn run_debug_listener(addr: SocketAddr, stats: Arc<RelayStats>) {
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!(debug_addr = %addr, error = %e, "debug endpoint disabled");
            return;
        }
    };
    info!(debug_addr = %addr, "debug endpoint started");

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    if let Err(e) = serve_debug_request(stream, &stats).await {
                        debug!(error = %e, "debug request failed");
                    }
                });
            }
            Err(e) => {
                warn!(error = %e, "debug accept failed");
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}

async fn serve_debug_request(mut stream: TcpStream, stats: &RelayStats) -> std::io::Result<()> {
    let mut buf = [0u8; 2048];
    let mut pos = 0;

    let path = loop {
        let n = stream.read(&mut buf[pos..]).await?;
        if n == 0 {
            return Ok(());
        }
        pos += n;

        let mut headers = [httparse::Header {
            name: "",
            value: &[],
        }; 16];
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(&buf[..pos]) {
            Ok(httparse::Status::Complete(_)) => break req.path.unwrap_or("/").to_string(),
            Ok(httparse::Status::Partial) => {
                if pos >= buf.len() {
                    return write_response(&mut stream, "400 Bad Request", "text/plain", "").await;
                }
            }
            Err(_) => {
                return write_response(&mut stream, "400 Bad Request", "text/plain", "").await;
            }
        }
    };

    match path.as_str() {
        "/healthz" => write_response(&mut stream, "200 OK", "text/plain", "ok").await,
        "/stats" => {
            let body =
                serde_json::to_string(&stats.snapshot()).unwrap_or_else(|_| "{}".to_string());
            write_response(&mut stream, "200 OK", "application/json", &body).await
        }
        _ => write_response(&mut stream, "404 Not Found", "text/plain", "not found").await,
    }
}

async fn write_response(
    stream: &mut TcpStream,
    status: &str,
    content_type: &str,
    body: &str,
) -> std::io::Result<()> {
    let reply = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    );
    stream.write_all(reply.as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await
}
