//! Automatic matching: role-partitioned books matched greedily in arrival
//! order.
//!
//! Sellers in the auto book are just ids; the registry record is the single
//! source of truth for quantity and limit price, so a manual purchase
//! against an auto seller's offer can never leave the book holding stale
//! numbers. Buyers are full standing orders, not registry records.
//!
//! The matcher is deliberately greedy and order-dependent: for each pending
//! buyer in arrival order it takes the *first* seller in arrival order that
//! satisfies quantity, limit price, and window containment, not the
//! cheapest. A matched buyer leaves the book unconditionally (no partial
//! buyer fills); a seller leaves when its offer is exhausted. The full
//! O(buyers × sellers) pass re-runs after every registration.

use crate::executor::{execute, BuyConstraint, TradeOutcome};
use crate::offer::{ActorId, OfferId};
use crate::registry::OfferRegistry;
use crate::window::TimeWindow;

/// A standing automatic buy order.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoBuyer {
    pub id: OfferId,
    pub owner: ActorId,
    pub quantity_kwh: f64,
    /// Maximum acceptable price per kWh.
    pub limit_price: f64,
    pub window: TimeWindow,
    pub duration_secs: u32,
}

/// Role-partitioned automatic order books, both in arrival order.
#[derive(Debug, Default)]
pub struct AutoBook {
    sellers: Vec<OfferId>,
    buyers: Vec<AutoBuyer>,
}

impl AutoBook {
    pub fn new() -> Self {
        AutoBook::default()
    }

    /// Enqueue the registry offer `id` as an automatic seller.
    pub fn insert_seller(&mut self, id: OfferId) {
        self.sellers.push(id);
    }

    pub fn insert_buyer(&mut self, buyer: AutoBuyer) {
        self.buyers.push(buyer);
    }

    pub fn pending_sellers(&self) -> &[OfferId] {
        &self.sellers
    }

    pub fn pending_buyers(&self) -> &[AutoBuyer] {
        &self.buyers
    }

    /// Remove one order (either role) by id. Used for explicit cancels.
    pub fn remove(&mut self, id: &OfferId) -> bool {
        let before = self.sellers.len() + self.buyers.len();
        self.sellers.retain(|s| s != id);
        self.buyers.retain(|b| &b.id != id);
        before != self.sellers.len() + self.buyers.len()
    }

    /// Drop buyer orders whose owner has no live session, and seller
    /// entries whose registry record is gone (the registry reaper already
    /// purged the orphaned offers themselves).
    pub fn purge_orphans(
        &mut self,
        live: &std::collections::HashSet<ActorId>,
        registry: &OfferRegistry,
    ) -> Vec<OfferId> {
        let mut removed = Vec::new();
        self.buyers.retain(|b| {
            if live.contains(&b.owner) {
                true
            } else {
                removed.push(b.id.clone());
                false
            }
        });
        self.sellers.retain(|id| {
            if registry.get(id).is_some() {
                true
            } else {
                removed.push(id.clone());
                false
            }
        });
        removed
    }

    /// One full greedy pass over the buyer book.
    ///
    /// Every committed match goes through [`execute`] so the registry
    /// decrement, exhaustion removal, and trade record all happen exactly
    /// as they do for manual trades.
    pub fn run_matches(&mut self, registry: &mut OfferRegistry) -> Vec<TradeOutcome> {
        // Shed seller entries whose offer has disappeared from the registry
        // (sold out manually, exited, or reaped).
        self.sellers.retain(|id| registry.get(id).is_some());

        let mut outcomes = Vec::new();
        let mut bi = 0;
        while bi < self.buyers.len() {
            let matched = {
                let buyer = &self.buyers[bi];
                self.sellers.iter().position(|id| {
                    registry.get(id).is_some_and(|offer| {
                        offer.quantity_kwh >= buyer.quantity_kwh
                            && offer.price_per_kwh <= buyer.limit_price
                            && offer
                                .window
                                .accommodates(&buyer.window, buyer.duration_secs)
                    })
                })
            };

            let Some(si) = matched else {
                bi += 1;
                continue;
            };

            let offer_id = self.sellers[si].clone();
            let buyer = self.buyers.remove(bi);
            let constraint = BuyConstraint {
                window: buyer.window,
                duration_secs: buyer.duration_secs,
            };

            match execute(
                registry,
                &buyer.owner,
                &offer_id,
                buyer.quantity_kwh,
                Some(constraint),
            ) {
                Ok(outcome) => {
                    if outcome.remaining_kwh.is_none() {
                        self.sellers.remove(si);
                    }
                    outcomes.push(outcome);
                    // The next pending buyer shifted into slot `bi`.
                }
                Err(_) => {
                    // The registry changed under us; the stale seller entry
                    // goes, the buyer stays pending.
                    self.sellers.remove(si);
                    self.buyers.insert(bi, buyer);
                }
            }
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offer::OfferDraft;

    fn day_window() -> TimeWindow {
        TimeWindow::parse("08:00", "18:00").unwrap()
    }

    fn register_seller(
        reg: &mut OfferRegistry,
        book: &mut AutoBook,
        owner: &str,
        qty: f64,
        min_price: f64,
    ) -> OfferId {
        let id = reg
            .register(
                OfferDraft {
                    owner: ActorId::new(owner),
                    energy_kind: "solar".to_string(),
                    quantity_kwh: qty,
                    price_per_kwh: min_price,
                    window: day_window(),
                    duration_secs: 3600,
                },
                0,
            )
            .unwrap();
        book.insert_seller(id.clone());
        id
    }

    fn buyer(reg: &mut OfferRegistry, owner: &str, qty: f64, max_price: f64) -> AutoBuyer {
        let owner = ActorId::new(owner);
        AutoBuyer {
            id: reg.allocate_id(&owner),
            owner,
            quantity_kwh: qty,
            limit_price: max_price,
            window: TimeWindow::parse("10:00", "12:00").unwrap(),
            duration_secs: 3600,
        }
    }

    #[test]
    fn first_fit_beats_best_price() {
        let mut reg = OfferRegistry::new();
        let mut book = AutoBook::new();
        let s1 = register_seller(&mut reg, &mut book, "s1", 5.0, 10.0);
        let s2 = register_seller(&mut reg, &mut book, "s2", 5.0, 8.0);

        let b1 = buyer(&mut reg, "b1", 5.0, 12.0);
        book.insert_buyer(b1);

        let outcomes = book.run_matches(&mut reg);
        assert_eq!(outcomes.len(), 1);
        // S1 arrived first and qualifies, so it wins despite S2 being
        // cheaper.
        assert_eq!(outcomes[0].offer_id, s1);
        assert_eq!(outcomes[0].price_per_kwh, 10.0);
        assert!(reg.get(&s1).is_none());
        assert!(reg.get(&s2).is_some());
        assert!(book.pending_buyers().is_empty());
    }

    #[test]
    fn buyer_above_all_limits_stays_pending() {
        let mut reg = OfferRegistry::new();
        let mut book = AutoBook::new();
        register_seller(&mut reg, &mut book, "s1", 5.0, 10.0);

        let b1 = buyer(&mut reg, "b1", 5.0, 9.0);
        book.insert_buyer(b1);

        assert!(book.run_matches(&mut reg).is_empty());
        assert_eq!(book.pending_buyers().len(), 1);
    }

    #[test]
    fn partial_seller_fill_keeps_seller_listed() {
        let mut reg = OfferRegistry::new();
        let mut book = AutoBook::new();
        let s1 = register_seller(&mut reg, &mut book, "s1", 12.0, 5.0);

        book.insert_buyer(buyer(&mut reg, "b1", 5.0, 6.0));
        let outcomes = book.run_matches(&mut reg);

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].remaining_kwh, Some(7.0));
        assert_eq!(book.pending_sellers(), &[s1.clone()]);
        assert_eq!(reg.get(&s1).unwrap().quantity_kwh, 7.0);
    }

    #[test]
    fn pass_matches_multiple_buyers_in_arrival_order() {
        let mut reg = OfferRegistry::new();
        let mut book = AutoBook::new();
        register_seller(&mut reg, &mut book, "s1", 5.0, 4.0);
        register_seller(&mut reg, &mut book, "s2", 8.0, 4.0);

        book.insert_buyer(buyer(&mut reg, "b1", 5.0, 5.0));
        book.insert_buyer(buyer(&mut reg, "b2", 8.0, 5.0));

        let outcomes = book.run_matches(&mut reg);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].buyer, ActorId::new("b1"));
        assert_eq!(outcomes[1].buyer, ActorId::new("b2"));
        assert!(book.pending_sellers().is_empty());
        assert!(book.pending_buyers().is_empty());
    }

    #[test]
    fn stale_seller_entries_are_shed() {
        let mut reg = OfferRegistry::new();
        let mut book = AutoBook::new();
        let s1 = register_seller(&mut reg, &mut book, "s1", 5.0, 4.0);

        // Offer sold out through the manual path.
        reg.decrement(&s1, 5.0).unwrap();

        book.insert_buyer(buyer(&mut reg, "b1", 5.0, 5.0));
        assert!(book.run_matches(&mut reg).is_empty());
        assert!(book.pending_sellers().is_empty());
        assert_eq!(book.pending_buyers().len(), 1);
    }
}
