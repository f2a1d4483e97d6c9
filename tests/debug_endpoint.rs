use portward::{run_debug_listener, RelayStats};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

async fn spawn_debug(stats: Arc<RelayStats>) -> u16 {
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    tokio::spawn(run_debug_listener(
        format!("127.0.0.1:{port}").parse().unwrap(),
        stats,
    ));
    tokio::time::sleep(Duration::from_millis(200)).await;
    port
}

#[tokio::test]
async fn test_healthz_responds_ok() {
    let port = spawn_debug(Arc::new(RelayStats::default())).await;

    let resp = reqwest::get(format!("http://127.0.0.1:{port}/healthz"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_stats_reports_counters_as_json() {
    let stats = Arc::new(RelayStats::default());
    stats.record_accepted();
    stats.record_denied();
    stats.record_session_opened();
    stats.record_session_closed(Some(42));
    let port = spawn_debug(Arc::clone(&stats)).await;

    let resp = reqwest::get(format!("http://127.0.0.1:{port}/stats"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["connections_accepted"], 1);
    assert_eq!(body["requests_denied"], 1);
    assert_eq!(body["active_sessions"], 0);
    assert_eq!(body["sessions_completed"], 1);
    assert_eq!(body["bytes_relayed"], 42);
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let port = spawn_debug(Arc::new(RelayStats::default())).await;

    let resp = reqwest::get(format!("http://127.0.0.1:{port}/pprof"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
