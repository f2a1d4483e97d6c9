//! `portward` - transparent TCP forwarder with first-request sniffing.
//!
//! Copyright (C) 2026 Maverick
//! SPDX-License-Identifier: AGPL-3.0-only
//!
//! Parses the command line, sets up logging, launches the debug endpoint,
//! and runs the relay listener.

use clap::Parser;
use portward::config::{
    parse_host_port, Config, FilterMode, DEFAULT_CONCURRENCY_LIMIT, DEFAULT_DEBUG_PORT,
};
use portward::core::relay::listener::RelayConfig;
use portward::core::relay::sniff::TargetPolicy;
use portward::{run_debug_listener, run_relay_listener, RelayStats};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "portward",
    version,
    about = "Transparent TCP forwarder with first-request sniffing"
)]
struct Cli {
    /// Local port to listen on
    #[arg(short = 'p', long = "port")]
    port: u16,

    /// Remote host:port every connection is forwarded to
    #[arg(short = 'r', long = "remote", value_parser = parse_host_port)]
    remote: String,

    /// Debug/stats endpoint port
    #[arg(short = 'd', long = "debug", default_value_t = DEFAULT_DEBUG_PORT)]
    debug_port: u16,

    /// How deny verdicts are applied: enforce or observe
    #[arg(long = "filter-mode", default_value = "enforce")]
    filter_mode: String,

    /// Request target to deny; repeatable, replaces the built-in list
    #[arg(long = "deny-target", value_name = "TARGET")]
    deny_targets: Vec<String>,

    /// Maximum concurrently served inbound connections
    #[arg(long = "max-connections", default_value_t = DEFAULT_CONCURRENCY_LIMIT)]
    max_connections: usize,

    /// Per-read idle timeout in seconds; 0 disables it
    #[arg(long = "idle-timeout", value_name = "SECS", default_value_t = 0)]
    idle_timeout_secs: u64,
}

impl Cli {
    fn into_config(self) -> Config {
        let mut config = Config::new(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port),
            self.remote,
        );
        config.debug_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.debug_port);
        config.filter_mode = FilterMode::from_str(&self.filter_mode);
        if !self.deny_targets.is_empty() {
            config.denied_targets = self.deny_targets;
        }
        config.concurrency_limit = self.max_connections;
        if self.idle_timeout_secs > 0 {
            config.idle_timeout = Some(Duration::from_secs(self.idle_timeout_secs));
        }
        config
    }
}

fn main() {
    dotenvy::dotenv().ok();

    let (non_blocking, _guard) = tracing_appender::non_blocking(std::io::stdout());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(non_blocking);

    if log_format.eq_ignore_ascii_case("pretty") {
        subscriber.init();
    } else {
        subscriber.json().init();
    }

    let config = Cli::parse().into_config();
    info!(
        listen_addr = %config.listen_addr,
        remote_addr = %config.remote_addr,
        debug_addr = %config.debug_addr,
        filter_mode = ?config.filter_mode,
        log_format = %log_format,
        "Relay initialized"
    );

    let stats = Arc::new(RelayStats::default());
    let relay_config = RelayConfig {
        listen_addr: config.listen_addr,
        remote_addr: config.remote_addr.clone(),
        filter_mode: config.filter_mode,
        policy: TargetPolicy::new(config.denied_targets.clone()),
        concurrency_limit: config.concurrency_limit,
        idle_timeout: config.idle_timeout,
        stats: Some(Arc::clone(&stats)),
    };

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    rt.block_on(async {
        tokio::spawn(run_debug_listener(config.debug_addr, Arc::clone(&stats)));

        if let Err(e) = run_relay_listener(relay_config).await {
            error!(error = %e, "Relay failed to start");
            std::process::exit(1);
        }
    });
}
