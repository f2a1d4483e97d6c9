use portward::config::FilterMode;
use portward::core::relay::listener::RelayConfig;
use portward::core::relay::sniff::TargetPolicy;
use portward::run_relay_listener;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Plain echo remote; sends back whatever arrives, chunk by chunk.
pub async fn spawn_echo_remote() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            if let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    loop {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                if socket.write_all(&buf[..n]).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        }
    });

    addr
}

/// Byte-reversing echo remote. Also records everything it received so
/// tests can assert the relay delivered bytes verbatim.
pub async fn spawn_reversing_remote() -> (SocketAddr, Arc<Mutex<Vec<u8>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let received_log = Arc::clone(&received);

    tokio::spawn(async move {
        loop {
            if let Ok((mut socket, _)) = listener.accept().await {
                let received = Arc::clone(&received_log);
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    loop {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                received.lock().await.extend_from_slice(&buf[..n]);
                                let mut reversed = buf[..n].to_vec();
                                reversed.reverse();
                                if socket.write_all(&reversed).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        }
    });

    (addr, received)
}

/// Remote that accepts and immediately closes each connection, flagging
/// that it was contacted at all.
pub async fn spawn_closing_remote() -> (SocketAddr, Arc<AtomicBool>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let contacted = Arc::new(AtomicBool::new(false));
    let contacted_flag = Arc::clone(&contacted);

    tokio::spawn(async move {
        loop {
            if let Ok((socket, _)) = listener.accept().await {
                contacted_flag.store(true, std::sync::atomic::Ordering::SeqCst);
                drop(socket);
            }
        }
    });

    (addr, contacted)
}

/// Starts the relay on an ephemeral port and returns its address.
pub async fn spawn_relay(remote_addr: SocketAddr, filter_mode: FilterMode) -> SocketAddr {
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let listen_addr = probe.local_addr().unwrap();
    drop(probe);

    let config = RelayConfig {
        listen_addr,
        remote_addr: remote_addr.to_string(),
        filter_mode,
        policy: TargetPolicy::new(["/?c=index&a=info".to_string()]),
        concurrency_limit: 64,
        idle_timeout: None,
        stats: None,
    };

    tokio::spawn(async move {
        let _ = run_relay_listener(config).await;
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    listen_addr
}
