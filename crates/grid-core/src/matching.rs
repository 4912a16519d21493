//! Manual matching: filter a registry snapshot against a buy request.
//!
//! An offer qualifies iff it holds at least the requested quantity, the
//! buyer's window is fully contained in the offer's window, and the buyer's
//! window is long enough for the required delivery duration. Qualifying
//! offers come back sorted ascending by price so the best offer is the
//! natural first pick; the selection itself stays advisory until the
//! transaction executor re-validates at commit time.

use crate::offer::{BuyRequest, Offer};

/// Scan a snapshot for offers that can serve `request`, cheapest first.
pub fn qualifying_offers(snapshot: &[Offer], request: &BuyRequest) -> Vec<Offer> {
    let mut hits: Vec<Offer> = snapshot
        .iter()
        .filter(|offer| {
            offer.quantity_kwh >= request.quantity_kwh
                && offer
                    .window
                    .accommodates(&request.window, request.duration_secs)
        })
        .cloned()
        .collect();

    // Ties break on id so the ordering is stable across identical prices.
    hits.sort_by(|a, b| {
        a.price_per_kwh
            .total_cmp(&b.price_per_kwh)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits
}
