//! grid-core
//!
//! Pure energy-trading logic:
//! - offers, buy requests, trade records
//! - wall-clock trading windows
//! - the offer registry (with gossip merge and tombstones)
//! - manual + automatic matching
//! - the transaction executor
//! - collaborator contracts (auth, ledger, hardware)

pub mod auto;
pub mod collab;
pub mod error;
pub mod executor;
pub mod matching;
pub mod offer;
pub mod registry;
pub mod trade;
pub mod window;

pub use auto::{AutoBook, AutoBuyer};
pub use error::{ConstraintError, ExecuteError, RegistryError};
pub use executor::{execute, BuyConstraint, TradeOutcome};
pub use matching::qualifying_offers;
pub use offer::{ActorId, BuyRequest, Offer, OfferDraft, OfferId, OfferOrigin};
pub use registry::{Decrement, OfferField, OfferRegistry};
pub use trade::{now_unix, TradeRecord, TradeRole};
pub use window::TimeWindow;
