//! Replication seam between the router and a deployment topology.
//!
//! The broker deployment is a single source of truth and replicates
//! nothing ([`NoReplication`]). The peer deployment installs a gossiping
//! implementation that eagerly broadcasts registry events and answers sync
//! pulls. The router calls these hooks after the local mutation has
//! committed; implementations must not block.

use grid_core::executor::TradeOutcome;
use grid_core::offer::{Offer, OfferId};

pub trait Replicator: Send + Sync {
    /// A local seller registered `offer`.
    fn offer_registered(&self, _offer: &Offer) {}

    /// A local seller updated `offer`.
    fn offer_updated(&self, _offer: &Offer) {}

    /// A local seller exited, or the reaper purged the offer.
    fn offer_removed(&self, _id: &OfferId) {}

    /// A trade committed locally; replicas must decrement their copies.
    fn trade_executed(&self, _outcome: &TradeOutcome) {}

    /// A remote peer asked for our full snapshot.
    fn snapshot_requested(&self, _from_host: &str, _from_port: u16, _snapshot: Vec<Offer>) {}
}

/// Centralized topology: nothing to replicate.
#[derive(Debug, Default)]
pub struct NoReplication;

impl Replicator for NoReplication {}
