//! Centralized broker binary.

use std::sync::Arc;

use grid_broker::collab::{authenticator_from, ledger_from, LogHardware};
use grid_broker::config::Config;
use grid_broker::replication::NoReplication;
use grid_broker::router::Deps;
use grid_broker::server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    let deps = Deps {
        authenticator: authenticator_from(config.credentials_file.as_deref())?,
        ledger: ledger_from(config.ledger_file.as_deref())?,
        hardware: Arc::new(LogHardware),
        replicator: Arc::new(NoReplication),
    };

    server::run(config, deps).await
}
