//! TCP listener and top-level broker wiring.
//!
//! This module:
//! - binds the configured address/port,
//! - spawns the single central router task that owns all mutable state,
//! - spawns the periodic stale-connection reaper,
//! - accepts connections, assigns each a `SessionId`, and spawns a
//!   per-session task.
//!
//! Per-session logic lives in `session`; the router loop in `router`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::router::{self, Deps};
use crate::session;
use crate::types::{RouterEvent, RouterTx, SessionId};

/// Global counter for assigning unique `SessionId`s. Sufficient and
/// threadsafe for one process.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_session_id() -> SessionId {
    SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
}

/// Spawn the router task and hand back its event channel.
pub fn spawn_router(deps: Arc<Deps>) -> RouterTx {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(router::run_router(rx, deps));
    tx
}

/// Spawn the periodic reaper, which just ticks the router.
pub fn spawn_reaper(router_tx: RouterTx, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // the first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            if router_tx.send(RouterEvent::ReapTick).is_err() {
                break;
            }
        }
    });
}

/// A bound, not-yet-serving broker. Split from [`run`] so tests can bind
/// port 0 and learn the real address.
pub struct Broker {
    listener: TcpListener,
    config: Config,
    deps: Arc<Deps>,
    router_tx: RouterTx,
}

impl Broker {
    pub async fn bind(config: Config, deps: Deps) -> Result<Broker> {
        let listener = TcpListener::bind(config.socket_addr_string()).await?;
        let deps = Arc::new(deps);

        let router_tx = spawn_router(deps.clone());
        spawn_reaper(
            router_tx.clone(),
            Duration::from_secs(config.reap_interval_secs),
        );

        info!(addr = %listener.local_addr()?, "broker listening");
        Ok(Broker {
            listener,
            config,
            deps,
            router_tx,
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. Runs until the process exits.
    pub async fn serve(self) -> Result<()> {
        let active = Arc::new(AtomicUsize::new(0));

        loop {
            let (stream, peer_addr) = self.listener.accept().await?;

            if active.load(Ordering::Acquire) >= self.config.max_sessions {
                warn!(%peer_addr, max = self.config.max_sessions, "session cap reached, dropping connection");
                // Drop the stream; the client sees the close.
                continue;
            }

            let session = next_session_id();
            info!(%session, %peer_addr, "accepted connection");

            let router_tx = self.router_tx.clone();
            let authenticator = self.deps.authenticator.clone();
            let active = active.clone();
            active.fetch_add(1, Ordering::AcqRel);

            tokio::spawn(async move {
                if let Err(e) =
                    session::run_session(session, stream, router_tx, authenticator, None).await
                {
                    warn!(%session, error = %e, "session ended with error");
                }
                active.fetch_sub(1, Ordering::AcqRel);
            });
        }
    }
}

/// Bind and serve with the given configuration.
pub async fn run(config: Config, deps: Deps) -> Result<()> {
    Broker::bind(config, deps).await?.serve().await
}
