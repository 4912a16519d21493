//! Configuration for a gossip peer.
//!
//! Environment variables:
//!
//! - `GRID_BIND_ADDR`          (default: "0.0.0.0")
//! - `GRID_PORT`               (default: "5000")
//! - `GRID_ADVERTISE_HOST`     (default: "127.0.0.1"): the host other
//!   peers should connect back to for sync responses
//! - `GRID_PEERS`              (default: empty): comma-separated
//!   `host:port` list of the other peers; our own advertised address is
//!   filtered out if present
//! - `GRID_MAX_SESSIONS`       (default: "1024")
//! - `GRID_SYNC_INTERVAL_SECS` (default: "5")
//! - `GRID_REAP_INTERVAL_SECS` (default: "30")
//! - `GRID_CREDENTIALS_FILE`, `GRID_LEDGER_FILE`: as for the broker

use std::env;
use std::path::PathBuf;

use grid_broker::config::read_env_or_default;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub advertise_host: String,
    /// Other peers' `host:port` addresses. Static; unreachable peers are
    /// skipped and retried on the next periodic tick.
    pub peers: Vec<String>,
    pub max_sessions: usize,
    pub sync_interval_secs: u64,
    pub reap_interval_secs: u64,
    pub credentials_file: Option<PathBuf>,
    pub ledger_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = env::var("GRID_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = read_env_or_default("GRID_PORT", 5000u16)?;
        let advertise_host =
            env::var("GRID_ADVERTISE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let self_addr = format!("{}:{}", advertise_host, port);
        let peers = parse_peer_list(&env::var("GRID_PEERS").unwrap_or_default(), &self_addr);

        Ok(Config {
            bind_addr,
            port,
            advertise_host,
            peers,
            max_sessions: read_env_or_default("GRID_MAX_SESSIONS", 1024usize)?,
            sync_interval_secs: read_env_or_default("GRID_SYNC_INTERVAL_SECS", 5u64)?,
            reap_interval_secs: read_env_or_default("GRID_REAP_INTERVAL_SECS", 30u64)?,
            credentials_file: env::var("GRID_CREDENTIALS_FILE").ok().map(PathBuf::from),
            ledger_file: env::var("GRID_LEDGER_FILE").ok().map(PathBuf::from),
        })
    }

    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Split a comma-separated peer list, dropping blanks and our own address.
fn parse_peer_list(raw: &str, self_addr: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != self_addr)
        .map(str::to_string)
        .collect()
}
