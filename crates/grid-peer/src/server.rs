//! Peer listener: one port, two kinds of traffic.
//!
//! The first frame on a connection decides what it is. A gossip tag means a
//! one-shot peer message: hand it to the router and hang up. Anything else
//! starts a client session, which runs exactly the broker's session loop
//! (AUTH first, then authenticated traffic) with the consumed frame handed
//! over.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use grid_broker::router::Deps;
use grid_broker::server::{next_session_id, spawn_reaper, spawn_router};
use grid_broker::session;
use grid_broker::types::{RouterEvent, RouterTx};
use grid_protocol::framing::read_frame;
use grid_protocol::wire::PeerMessage;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::gossip;

/// A bound, not-yet-serving peer node.
pub struct Peer {
    listener: TcpListener,
    config: Config,
    deps: Arc<Deps>,
    router_tx: RouterTx,
}

impl Peer {
    /// Bind the listener and start the router, reaper, and sync loop.
    ///
    /// `deps.replicator` should be a [`gossip::GossipReplicator`] built
    /// from the same peer list; [`with_gossip`](Peer::with_gossip) wires
    /// that up from config.
    pub async fn bind(mut config: Config, deps: Deps) -> Result<Peer> {
        let listener = TcpListener::bind(config.socket_addr_string()).await?;
        if config.port == 0 {
            // Ephemeral bind: advertise the port we actually got.
            config.port = listener.local_addr()?.port();
        }
        let deps = Arc::new(deps);

        let router_tx = spawn_router(deps.clone());
        spawn_reaper(
            router_tx.clone(),
            Duration::from_secs(config.reap_interval_secs),
        );
        gossip::spawn_sync_loop(
            config.peers.clone(),
            config.advertise_host.clone(),
            config.port,
            Duration::from_secs(config.sync_interval_secs),
        );

        info!(
            addr = %listener.local_addr()?,
            peers = config.peers.len(),
            "peer listening"
        );
        Ok(Peer {
            listener,
            config,
            deps,
            router_tx,
        })
    }

    /// Bind with collaborators from `deps` and gossip wired from config.
    pub async fn with_gossip(config: Config, mut deps: Deps) -> Result<Peer> {
        deps.replicator = Arc::new(gossip::GossipReplicator::new(config.peers.clone()));
        Peer::bind(config, deps).await
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
                continue;
            }

            let router_tx = self.router_tx.clone();
            let authenticator = self.deps.authenticator.clone();
            let active = active.clone();
            active.fetch_add(1, Ordering::AcqRel);

            tokio::spawn(async move {
                if let Err(e) = classify_connection(stream, router_tx, authenticator).await {
                    debug!(%peer_addr, error = %e, "inbound connection failed");
                }
                active.fetch_sub(1, Ordering::AcqRel);
            });
        }
    }
}

/// Read the first frame and dispatch: gossip one-shot or client session.
async fn classify_connection(
    mut stream: TcpStream,
    router_tx: RouterTx,
    authenticator: Arc<dyn grid_core::collab::Authenticator>,
) -> Result<()> {
    let Some(frame) = read_frame(&mut stream).await? else {
        return Ok(());
    };

    if let Ok(msg) = serde_json::from_slice::<PeerMessage>(&frame) {
        debug!(?msg, "gossip received");
        let _ = router_tx.send(RouterEvent::Peer(msg));
        return Ok(());
    }

    let session = next_session_id();
    debug!(%session, "client session opened");
    session::run_session(session, stream, router_tx, authenticator, Some(frame)).await
}

/// Bind and serve with the given configuration.
pub async fn run(config: Config, deps: Deps) -> Result<()> {
    Peer::with_gossip(config, deps).await?.serve().await
}
