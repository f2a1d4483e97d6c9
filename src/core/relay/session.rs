//! Relay session execution.
//!
//! Owns the paired inbound/outbound streams, copies bytes in both
//! directions until either side ends, then tears the whole session down.

use crate::config::RelayError;
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Per-direction copy buffer size.
const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Direction of a relay copy task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client toward the remote endpoint.
    ClientToRemote,
    /// Remote endpoint toward the client.
    RemoteToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientToRemote => f.write_str("client->remote"),
            Self::RemoteToClient => f.write_str("remote->client"),
        }
    }
}

/// Opens the single outbound connection a pipeline is allowed.
///
/// # Errors
///
/// Returns `RelayError::Dial` carrying the remote address and the
/// underlying I/O error.
pub async fn dial_remote(remote_addr: &str) -> Result<TcpStream, RelayError> {
    TcpStream::connect(remote_addr)
        .await
        .map_err(|source| RelayError::Dial {
            addr: remote_addr.to_string(),
            source,
        })
}

/// Runs both copy directions and returns the first terminal outcome.
///
/// `prefix` holds bytes already drained from the inbound socket; they are
/// written to the outbound side before anything else, so the remote sees
/// them ahead of any later inbound bytes. The first direction to finish
/// decides the session result; by the time this returns both tasks have
/// been reaped and all four stream halves dropped, so both connections are
/// closed together.
pub async fn run_session(
    inbound: TcpStream,
    outbound: TcpStream,
    prefix: Vec<u8>,
    idle_timeout: Option<Duration>,
) -> (Direction, io::Result<u64>) {
    let (inbound_rd, inbound_wr) = inbound.into_split();
    let (outbound_rd, outbound_wr) = outbound.into_split();

    // Capacity 2: both directions can publish an outcome without blocking,
    // even when nobody is left to read the second one.
    let (tx, mut rx) = mpsc::channel::<(Direction, io::Result<u64>)>(2);

    let upstream_tx = tx.clone();
    let upstream = tokio::spawn(async move {
        let result = copy_direction(inbound_rd, outbound_wr, prefix, idle_timeout).await;
        let _ = upstream_tx.send((Direction::ClientToRemote, result)).await;
    });

    let downstream = tokio::spawn(async move {
        let result = copy_direction(outbound_rd, inbound_wr, Vec::new(), idle_timeout).await;
        let _ = tx.send((Direction::RemoteToClient, result)).await;
    });

    let outcome = match rx.recv().await {
        Some(outcome) => outcome,
        // Both tasks died without reporting; treat it as a broken session.
        None => (
            Direction::ClientToRemote,
            Err(io::Error::other("relay tasks exited without a result")),
        ),
    };

    upstream.abort();
    downstream.abort();
    let _ = upstream.await;
    let _ = downstream.await;

    outcome
}

/// Copies one direction until EOF, an I/O error, or an idle deadline.
///
/// The write side only ever advances by the byte count the read confirmed,
/// and each direction owns its buffer, so a short read can never leak
/// stale bytes into the stream.
async fn copy_direction(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    prefix: Vec<u8>,
    idle_timeout: Option<Duration>,
) -> io::Result<u64> {
    let mut relayed = 0u64;

    if !prefix.is_empty() {
        writer.write_all(&prefix).await?;
        relayed += prefix.len() as u64;
    }

    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = read_with_deadline(&mut reader, &mut buf, idle_timeout).await?;
        if n == 0 {
            // Our side finished; pass the close on so the peer is not left
            // waiting on a half-open stream.
            let _ = writer.shutdown().await;
            return Ok(relayed);
        }
        writer.write_all(&buf[..n]).await?;
        relayed += n as u64;
    }
}

async fn read_with_deadline(
    reader: &mut OwnedReadHalf,
    buf: &mut [u8],
    idle_timeout: Option<Duration>,
) -> io::Result<usize> {
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, reader.read(buf))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "relay direction idle"))?,
        None => reader.read(buf).await,
    }
}
