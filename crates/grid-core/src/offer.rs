//! Offer records and the identities that own them.
//!
//! An [`Offer`] never holds a live connection: its `owner` is a lookup key
//! into the session table kept by the networking layer (arena + index, not
//! ownership). An offer whose owner has no live session is an orphan and is
//! purged by the periodic reaper.

use serde::{Deserialize, Serialize};

use crate::error::ConstraintError;
use crate::window::TimeWindow;

/// Authenticated actor identity (the username bound to a session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(name: impl Into<String>) -> Self {
        ActorId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque unique offer token.
///
/// Allocated by the registry as `{owner}-{serial}`; the owner prefix keeps
/// ids from colliding when offers gossip between peers that each run their
/// own serial counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OfferId(pub String);

impl OfferId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OfferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a record entered this registry.
///
/// Not serialized: a receiving node decides the origin of everything it
/// merges, so a gossiped copy can never claim to be session-owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OfferOrigin {
    /// Registered by a locally connected session; reaped when that session
    /// dies without cleaning up.
    #[default]
    Session,

    /// Replicated from another peer; only the owning peer reaps it.
    Remote,
}

/// An active sell listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub owner: ActorId,
    pub energy_kind: String,
    pub quantity_kwh: f64,
    pub price_per_kwh: f64,
    pub window: TimeWindow,
    pub duration_secs: u32,
    /// Unix seconds at registration; last-writer-wins tiebreak for humans
    /// reading logs, not a vector clock.
    pub created_at: u64,
    #[serde(skip, default)]
    pub origin: OfferOrigin,
}

/// Seller-supplied fields of a new offer; the registry allocates the id and
/// stamps the rest.
#[derive(Debug, Clone)]
pub struct OfferDraft {
    pub owner: ActorId,
    pub energy_kind: String,
    pub quantity_kwh: f64,
    pub price_per_kwh: f64,
    pub window: TimeWindow,
    pub duration_secs: u32,
}

impl OfferDraft {
    /// Validate the numeric invariants: quantity strictly positive, price
    /// non-negative.
    pub fn validate(&self) -> Result<(), ConstraintError> {
        if !(self.quantity_kwh > 0.0) {
            return Err(ConstraintError::NonPositiveQuantity);
        }
        if !(self.price_per_kwh >= 0.0) {
            return Err(ConstraintError::NegativePrice);
        }
        Ok(())
    }
}

/// Ephemeral manual buy query. Used once to filter a snapshot, never stored.
#[derive(Debug, Clone)]
pub struct BuyRequest {
    pub requester: ActorId,
    pub quantity_kwh: f64,
    pub window: TimeWindow,
    pub duration_secs: u32,
}
