//! Eager broadcast and pull-based anti-entropy.
//!
//! Two propagation paths, both one-shot connections (open, one frame,
//! close):
//! - register/update/exit/trade events broadcast to every peer the moment
//!   they commit locally, so steady-state convergence is fast;
//! - every sync interval a `SYNC_REQUEST` goes out with our return address,
//!   and each recipient connects back with its full snapshot. This is the
//!   repair path for missed broadcasts, not the primary one.
//!
//! An unreachable peer is logged and skipped (no retry, no backoff); the
//! next periodic tick reattempts.

use std::time::Duration;

use grid_broker::replication::Replicator;
use grid_core::executor::TradeOutcome;
use grid_core::offer::{Offer, OfferId};
use grid_protocol::framing::write_message;
use grid_protocol::wire::PeerMessage;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Deliver one gossip message to one peer, fire-and-forget.
pub async fn send_to_peer(addr: String, msg: PeerMessage) {
    match TcpStream::connect(&addr).await {
        Ok(mut stream) => {
            if let Err(e) = write_message(&mut stream, &msg).await {
                warn!(peer = %addr, error = %e, "gossip send failed, skipping");
            } else {
                debug!(peer = %addr, "gossip sent");
            }
        }
        Err(e) => {
            warn!(peer = %addr, error = %e, "peer unreachable, skipping");
        }
    }
}

/// The peer topology's [`Replicator`]: fans every committed registry event
/// out to the static peer list.
pub struct GossipReplicator {
    peers: Vec<String>,
}

impl GossipReplicator {
    pub fn new(peers: Vec<String>) -> Self {
        GossipReplicator { peers }
    }

    fn broadcast(&self, msg: PeerMessage) {
        for peer in &self.peers {
            tokio::spawn(send_to_peer(peer.clone(), msg.clone()));
        }
    }
}

impl Replicator for GossipReplicator {
    fn offer_registered(&self, offer: &Offer) {
        self.broadcast(PeerMessage::OfferRegister {
            offer: offer.clone(),
        });
    }

    fn offer_updated(&self, offer: &Offer) {
        self.broadcast(PeerMessage::OfferUpdate {
            offer: offer.clone(),
        });
    }

    fn offer_removed(&self, id: &OfferId) {
        self.broadcast(PeerMessage::OfferExit {
            offer_id: id.clone(),
        });
    }

    fn trade_executed(&self, outcome: &TradeOutcome) {
        self.broadcast(PeerMessage::Trade {
            offer_id: outcome.offer_id.clone(),
            buyer: outcome.buyer.clone(),
            seller: outcome.seller.clone(),
            quantity_kwh: outcome.quantity_kwh,
            price_per_kwh: outcome.price_per_kwh,
            duration_secs: outcome.duration_secs,
        });
    }

    fn snapshot_requested(&self, from_host: &str, from_port: u16, snapshot: Vec<Offer>) {
        // Reply over a fresh connection to the requester's advertised
        // address, not the one the request arrived on.
        let addr = format!("{}:{}", from_host, from_port);
        tokio::spawn(send_to_peer(addr, PeerMessage::SyncResponse { offers: snapshot }));
    }
}

/// Periodic anti-entropy pull: broadcast `SYNC_REQUEST` to every peer.
pub fn spawn_sync_loop(
    peers: Vec<String>,
    advertise_host: String,
    advertise_port: u16,
    interval: Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // skip the immediate first tick
        loop {
            ticker.tick().await;
            for peer in &peers {
                let msg = PeerMessage::SyncRequest {
                    from_host: advertise_host.clone(),
                    from_port: advertise_port,
                };
                tokio::spawn(send_to_peer(peer.clone(), msg));
            }
        }
    });
}
