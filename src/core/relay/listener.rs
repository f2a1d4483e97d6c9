//! Relay listener and per-connection intake.
//!
//! Accepts inbound connections, performs the single first-chunk read, runs
//! the sniffer over it, and hands surviving connections to the session
//! relay.

use crate::config::{FilterMode, RelayError};
use crate::core::relay::response;
use crate::core::relay::session;
use crate::core::relay::sniff::{self, TargetPolicy, Verdict};
use crate::debug::RelayStats;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// First-chunk read size. One read attempt per connection, never refilled.
const SNIFF_BUFFER_SIZE: usize = 1024;

/// Everything the relay core needs; assembled by the CLI layer.
#[derive(Clone)]
pub struct RelayConfig {
    /// Address to accept inbound connections on.
    pub listen_addr: SocketAddr,
    /// Fixed `host:port` every connection is forwarded to.
    pub remote_addr: String,
    /// How deny verdicts are applied.
    pub filter_mode: FilterMode,
    /// Deny list consulted for every sniffed request.
    pub policy: TargetPolicy,
    /// Maximum concurrently served connections.
    pub concurrency_limit: usize,
    /// Optional per-read deadline inside the relay.
    pub idle_timeout: Option<Duration>,
    /// Counters for the debug endpoint, when one is running.
    pub stats: Option<Arc<RelayStats>>,
}

/// Runs the accept loop until the process exits.
///
/// Each accepted connection is served on its own task; the accept loop
/// never waits on any individual connection. A semaphore caps how many
/// connections are in flight, applying backpressure at `accept` time
/// rather than failing.
///
/// # Errors
///
/// Returns `RelayError::Listen` when the listen address cannot be bound.
/// Everything after that is per-connection and only logged.
pub async fn run_relay_listener(config: RelayConfig) -> Result<(), RelayError> {
    let listener = TcpListener::bind(config.listen_addr)
        .await
        .map_err(|source| RelayError::Listen {
            addr: config.listen_addr,
            source,
        })?;

    info!(
        listen_addr = %config.listen_addr,
        remote_addr = %config.remote_addr,
        filter_mode = ?config.filter_mode,
        "relay listener started"
    );

    let connection_limit = Arc::new(Semaphore::new(config.concurrency_limit));
    let mut accept_seq: u64 = 0;

    loop {
        let Ok(permit) = connection_limit.clone().acquire_owned().await else {
            break;
        };

        match listener.accept().await {
            Ok((client, peer_addr)) => {
                accept_seq += 1;
                let seq = accept_seq;
                let config = config.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    handle_connection(client, peer_addr, seq, &config).await;
                });
            }
            Err(e) => {
                error!(error = %e, "failed to accept connection");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }

    Ok(())
}

/// Serves one inbound connection from first read to session teardown.
async fn handle_connection(
    mut client: TcpStream,
    peer_addr: SocketAddr,
    seq: u64,
    config: &RelayConfig,
) {
    configure_tcp_stream(&client);
    if let Some(stats) = &config.stats {
        stats.record_accepted();
    }
    info!(seq, peer_addr = %peer_addr, remote_addr = %config.remote_addr, "connection received");

    let mut first_chunk = vec![0u8; SNIFF_BUFFER_SIZE];
    let n = match client.read(&mut first_chunk).await {
        Ok(n) => n,
        Err(e) => {
            // The pipeline continues with nothing to sniff; a dead socket
            // will resurface inside the session and end it there.
            debug!(seq, error = %e, "first read failed");
            0
        }
    };
    first_chunk.truncate(n);

    if n > 0 && !screen_first_chunk(&mut client, &first_chunk, seq, config).await {
        return;
    }

    let outbound = match session::dial_remote(&config.remote_addr).await {
        Ok(stream) => stream,
        Err(e) => {
            error!(seq, error = %e, "dial failed");
            if let Some(stats) = &config.stats {
                stats.record_dial_failure();
            }
            let _ = client.write_all(e.to_string().as_bytes()).await;
            let _ = client.shutdown().await;
            return;
        }
    };
    configure_tcp_stream(&outbound);

    if let Some(stats) = &config.stats {
        stats.record_session_opened();
    }

    let (initiator, result) =
        session::run_session(client, outbound, first_chunk, config.idle_timeout).await;
    let relayed = match &result {
        Ok(bytes) => {
            debug!(seq, ended_by = %initiator, bytes, "session ended");
            Some(*bytes)
        }
        Err(e) => {
            debug!(seq, ended_by = %initiator, error = %e, "session ended");
            None
        }
    };
    if let Some(stats) = &config.stats {
        stats.record_session_closed(relayed);
    }
}

/// Sniffs and classifies the first chunk.
///
/// Returns `false` when the connection was rejected and must not be
/// relayed. Unclassifiable chunks always pass; the relay is transparent
/// first and a filter second.
async fn screen_first_chunk(
    client: &mut TcpStream,
    chunk: &[u8],
    seq: u64,
    config: &RelayConfig,
) -> bool {
    let request = match sniff::parse_request(chunk) {
        Ok(request) => request,
        Err(e) => {
            debug!(seq, error = %e, "first chunk not classifiable, forwarding");
            if let Some(stats) = &config.stats {
                stats.record_sniff_error();
            }
            return true;
        }
    };

    debug!(
        seq,
        method = request.method,
        request_target = request.target,
        protocol = request.protocol,
        host = request.host,
        "request sniffed"
    );

    if config.policy.classify(&request) == Verdict::Allow {
        return true;
    }
    if let Some(stats) = &config.stats {
        stats.record_denied();
    }

    match config.filter_mode {
        FilterMode::Observe => {
            warn!(seq, request_target = request.target, "denied target observed, forwarding anyway");
            true
        }
        FilterMode::Enforce => {
            warn!(seq, request_target = request.target, "rejecting denied target");
            if let Err(e) = write_and_close(client, &response::not_found_response()).await {
                debug!(seq, error = %e, "rejection write failed");
            }
            false
        }
    }
}

async fn write_and_close(client: &mut TcpStream, payload: &[u8]) -> io::Result<()> {
    client.write_all(payload).await?;
    client.flush().await?;
    client.shutdown().await
}

/// Applies keepalive and latency settings to a relay-side socket.
fn configure_tcp_stream(stream: &TcpStream) {
    let sock = socket2::SockRef::from(stream);

    let _ = stream.set_nodelay(true);

    let mut keepalive = socket2::TcpKeepalive::new()
        .with_time(Duration::from_secs(60))
        .with_interval(Duration::from_secs(10));

    #[cfg(not(target_os = "openbsd"))]
    {
        keepalive = keepalive.with_retries(3);
    }

    let _ = sock.set_tcp_keepalive(&keepalive);

    // Cap how long unacknowledged data can sit in the send queue before
    // the kernel gives up on the peer.
    #[cfg(target_os = "linux")]
    {
        let _ = sock.set_tcp_user_timeout(Some(Duration::from_millis(10_000)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::net::TcpListener;

    async fn spawn_echo_backend() -> SocketAddr {
        let backend = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
        let addr = backend.local_addr().expect("local_addr failed");
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = backend.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    loop {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                if stream.write_all(&buf[..n]).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });
        addr
    }

    async fn start_relay(remote_addr: &str, filter_mode: FilterMode) -> SocketAddr {
        let probe = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
        let listen_addr = probe.local_addr().expect("local_addr failed");
        drop(probe);

        let mut config = crate::test_utils::create_test_config(listen_addr, remote_addr);
        config.filter_mode = filter_mode;
        tokio::spawn(async move {
            let _ = run_relay_listener(config).await;
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        listen_addr
    }

    #[test]
    fn test_relay_config_clone() {
        let config = crate::test_utils::create_test_config(
            "127.0.0.1:9501".parse().expect("addr parse failed"),
            "127.0.0.1:6001",
        );
        let cloned = config.clone();
        assert_eq!(cloned.listen_addr, config.listen_addr);
        assert_eq!(cloned.remote_addr, config.remote_addr);
        assert_eq!(cloned.filter_mode, config.filter_mode);
        assert_eq!(cloned.concurrency_limit, config.concurrency_limit);
    }

    #[tokio::test]
    async fn test_enforce_rejects_denied_target_without_dialing() {
        let backend = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
        let backend_addr = backend.local_addr().expect("local_addr failed");
        let dialed = Arc::new(AtomicBool::new(false));
        let dialed_flag = Arc::clone(&dialed);
        tokio::spawn(async move {
            loop {
                if backend.accept().await.is_ok() {
                    dialed_flag.store(true, Ordering::SeqCst);
                }
            }
        });

        let listen_addr = start_relay(&backend_addr.to_string(), FilterMode::Enforce).await;

        let mut client = TcpStream::connect(listen_addr).await.expect("connect failed");
        client
            .write_all(b"GET /?c=index&a=info HTTP/1.1\r\nHost: localhost:9501\r\n\r\n")
            .await
            .expect("write failed");

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.expect("read failed");
        let reply = String::from_utf8(reply).expect("reply is not utf-8");
        assert!(reply.starts_with("HTTP/1.1 404 Not Found\r\n"), "{reply}");
        assert!(reply.ends_with("404 page not found"), "{reply}");

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!dialed.load(Ordering::SeqCst), "remote was dialed for a rejected request");
    }

    #[tokio::test]
    async fn test_observe_forwards_denied_target() {
        let backend_addr = spawn_echo_backend().await;
        let listen_addr = start_relay(&backend_addr.to_string(), FilterMode::Observe).await;

        let request = b"GET /?c=index&a=info HTTP/1.1\r\nHost: localhost:9501\r\n\r\n";
        let mut client = TcpStream::connect(listen_addr).await.expect("connect failed");
        client.write_all(request).await.expect("write failed");

        let mut echoed = vec![0u8; request.len()];
        client.read_exact(&mut echoed).await.expect("read failed");
        assert_eq!(echoed, request);
    }

    #[tokio::test]
    async fn test_unclassifiable_chunk_is_forwarded() {
        let backend_addr = spawn_echo_backend().await;
        let listen_addr = start_relay(&backend_addr.to_string(), FilterMode::Enforce).await;

        let mut client = TcpStream::connect(listen_addr).await.expect("connect failed");
        client
            .write_all(b"nonsense without any crlf")
            .await
            .expect("write failed");

        let mut echoed = [0u8; 25];
        client.read_exact(&mut echoed).await.expect("read failed");
        assert_eq!(&echoed, b"nonsense without any crlf");
    }

    #[tokio::test]
    async fn test_dial_failure_reported_to_client() {
        // A freed ephemeral port, so the dial is refused.
        let probe = TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
        let dead_addr = probe.local_addr().expect("local_addr failed").to_string();
        drop(probe);

        let listen_addr = start_relay(&dead_addr, FilterMode::Enforce).await;

        let mut client = TcpStream::connect(listen_addr).await.expect("connect failed");
        client.write_all(b"ping").await.expect("write failed");

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.expect("read failed");
        let reply = String::from_utf8(reply).expect("reply is not utf-8");
        assert!(reply.contains("failed to dial remote"), "{reply}");
    }
}
