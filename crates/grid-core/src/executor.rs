//! Transaction executor: the single commit point for trades.
//!
//! A buyer's selection is advisory; everything about the offer may have
//! changed between proposal and confirmation. `execute` therefore re-checks
//! existence, remaining quantity, and (when the buyer supplied one) window
//! compatibility in the same critical section as the decrement. Two buyers
//! racing for one offer resolve first-committer-wins; the loser gets
//! [`ExecuteError::Insufficient`] or [`ExecuteError::NotFound`].
//!
//! The trade is final once the registry mutation commits. Ledger appends and
//! party notifications happen after the fact and are best-effort.

use crate::error::{ConstraintError, ExecuteError};
use crate::offer::{ActorId, OfferId};
use crate::registry::{Decrement, OfferRegistry};
use crate::trade::{now_unix, TradeRecord};
use crate::window::TimeWindow;

/// Buyer-side constraints re-validated at commit time.
#[derive(Debug, Clone, Copy)]
pub struct BuyConstraint {
    pub window: TimeWindow,
    pub duration_secs: u32,
}

/// A committed trade, ready for ledgering and notification.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeOutcome {
    pub offer_id: OfferId,
    pub buyer: ActorId,
    pub seller: ActorId,
    pub quantity_kwh: f64,
    pub price_per_kwh: f64,
    pub duration_secs: u32,
    /// Quantity left on the offer, `None` when the trade exhausted it.
    pub remaining_kwh: Option<f64>,
    pub executed_at: u64,
}

impl TradeOutcome {
    /// The immutable ledger row. Appended once per party.
    pub fn record(&self) -> TradeRecord {
        TradeRecord {
            buyer: self.buyer.clone(),
            seller: self.seller.clone(),
            offer_id: self.offer_id.clone(),
            quantity_kwh: self.quantity_kwh,
            price_per_kwh: self.price_per_kwh,
            executed_at: self.executed_at,
        }
    }
}

/// Commit a purchase of `quantity` kWh against `offer_id`.
///
/// Preconditions run atomically with the decrement (the caller serializes
/// all registry mutations through one owner task). When the offer is
/// exhausted it is removed in the same step.
pub fn execute(
    registry: &mut OfferRegistry,
    buyer: &ActorId,
    offer_id: &OfferId,
    quantity: f64,
    constraint: Option<BuyConstraint>,
) -> Result<TradeOutcome, ExecuteError> {
    if !(quantity > 0.0) {
        return Err(ConstraintError::NonPositiveQuantity.into());
    }

    let offer = registry
        .get(offer_id)
        .ok_or_else(|| ExecuteError::NotFound(offer_id.clone()))?;

    if let Some(c) = &constraint {
        if !offer.window.accommodates(&c.window, c.duration_secs) {
            return Err(ExecuteError::WindowMismatch(offer_id.clone()));
        }
    }

    let seller = offer.owner.clone();
    let price = offer.price_per_kwh;
    let duration_secs = constraint
        .map(|c| c.duration_secs)
        .unwrap_or(offer.duration_secs);

    let remaining_kwh = match registry.decrement(offer_id, quantity)? {
        Decrement::Remaining(left) => Some(left),
        Decrement::Exhausted => None,
    };

    Ok(TradeOutcome {
        offer_id: offer_id.clone(),
        buyer: buyer.clone(),
        seller,
        quantity_kwh: quantity,
        price_per_kwh: price,
        duration_secs,
        remaining_kwh,
        executed_at: now_unix(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::OfferDraft;

    fn registry_with_offer(qty: f64) -> (OfferRegistry, OfferId) {
        let mut reg = OfferRegistry::new();
        let id = reg
            .register(
                OfferDraft {
                    owner: ActorId::new("alice"),
                    energy_kind: "solar".to_string(),
                    quantity_kwh: qty,
                    price_per_kwh: 5.0,
                    window: TimeWindow::parse("09:00", "17:00").unwrap(),
                    duration_secs: 3600,
                },
                0,
            )
            .unwrap();
        (reg, id)
    }

    fn constraint(start: &str, end: &str) -> BuyConstraint {
        BuyConstraint {
            window: TimeWindow::parse(start, end).unwrap(),
            duration_secs: 3600,
        }
    }

    #[test]
    fn commit_decrements_and_reports_remaining() {
        let (mut reg, id) = registry_with_offer(10.0);
        let buyer = ActorId::new("bob");

        let outcome = execute(
            &mut reg,
            &buyer,
            &id,
            5.0,
            Some(constraint("10:00", "11:00")),
        )
        .unwrap();

        assert_eq!(outcome.remaining_kwh, Some(5.0));
        assert_eq!(outcome.price_per_kwh, 5.0);
        assert_eq!(outcome.seller, ActorId::new("alice"));
        assert_eq!(reg.get(&id).unwrap().quantity_kwh, 5.0);

        let record = outcome.record();
        assert_eq!(record.buyer, buyer);
        assert_eq!(record.quantity_kwh, 5.0);
    }

    #[test]
    fn exhausting_trade_removes_the_offer() {
        let (mut reg, id) = registry_with_offer(5.0);

        let outcome = execute(&mut reg, &ActorId::new("bob"), &id, 5.0, None).unwrap();
        assert_eq!(outcome.remaining_kwh, None);
        assert!(reg.get(&id).is_none());
    }

    #[test]
    fn first_committer_wins() {
        let (mut reg, id) = registry_with_offer(6.0);

        execute(&mut reg, &ActorId::new("bob"), &id, 5.0, None).unwrap();
        let err = execute(&mut reg, &ActorId::new("carol"), &id, 5.0, None).unwrap_err();
        assert!(matches!(err, ExecuteError::Insufficient { .. }));
    }

    #[test]
    fn window_revalidated_at_commit() {
        let (mut reg, id) = registry_with_offer(10.0);

        let err = execute(
            &mut reg,
            &ActorId::new("bob"),
            &id,
            5.0,
            Some(constraint("08:00", "12:00")),
        )
        .unwrap_err();
        assert_eq!(err, ExecuteError::WindowMismatch(id.clone()));
        // A failed commit leaves the offer untouched.
        assert_eq!(reg.get(&id).unwrap().quantity_kwh, 10.0);
    }
}
