//! Configuration for the broker.
//!
//! Defaults work out of the box; override via environment variables:
//!
//! - `GRID_BIND_ADDR`          (default: "0.0.0.0")
//! - `GRID_PORT`               (default: "65432")
//! - `GRID_MAX_SESSIONS`       (default: "1024")
//! - `GRID_REAP_INTERVAL_SECS` (default: "30")
//! - `GRID_CREDENTIALS_FILE`   (default: unset, meaning any non-empty
//!   username authenticates; set a JSON `{"user": "password"}` file in
//!   production)
//! - `GRID_LEDGER_FILE`        (default: unset, trades are not persisted)

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address / interface to bind to.
    pub bind_addr: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Maximum number of simultaneously connected sessions.
    pub max_sessions: usize,

    /// How often the stale-connection reaper runs.
    pub reap_interval_secs: u64,

    /// JSON credentials file, `{"username": "password", ...}`.
    pub credentials_file: Option<PathBuf>,

    /// JSON-lines trade ledger output.
    pub ledger_file: Option<PathBuf>,
}

impl Config {
    /// Construct a `Config` from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            bind_addr: env::var("GRID_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: read_env_or_default("GRID_PORT", 65432u16)?,
            max_sessions: read_env_or_default("GRID_MAX_SESSIONS", 1024usize)?,
            reap_interval_secs: read_env_or_default("GRID_REAP_INTERVAL_SECS", 30u64)?,
            credentials_file: env::var("GRID_CREDENTIALS_FILE").ok().map(PathBuf::from),
            ledger_file: env::var("GRID_LEDGER_FILE").ok().map(PathBuf::from),
        })
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
            max_sessions: 1024,
            reap_interval_secs: 30,
            credentials_file: None,
            ledger_file: None,
        }
    }
}

pub fn read_env_or_default<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(val) => Ok(val.parse::<T>()?),
        Err(_) => Ok(default),
    }
}
