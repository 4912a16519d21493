//! Immutable trade records and the notification payload both parties get.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::offer::{ActorId, OfferId};

/// Which side of a completed trade an actor was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeRole {
    #[serde(rename = "buyer")]
    Buyer,
    #[serde(rename = "seller")]
    Seller,
}

impl std::fmt::Display for TradeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeRole::Buyer => f.write_str("buyer"),
            TradeRole::Seller => f.write_str("seller"),
        }
    }
}

/// One executed trade, from one party's perspective. Immutable once created;
/// appended to the ledger collaborator, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub buyer: ActorId,
    pub seller: ActorId,
    pub offer_id: OfferId,
    pub quantity_kwh: f64,
    pub price_per_kwh: f64,
    pub executed_at: u64,
}

/// Current wall clock as unix seconds.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
