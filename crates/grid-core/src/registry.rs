//! The offer registry: single source of truth for active offers within one
//! process.
//!
//! The struct itself is single-threaded. Serialization of concurrent
//! mutations is the caller's job; the networking layer funnels every
//! mutation through one router task that owns the registry, so `decrement`
//! and `remove` can never race. Compound operations are atomic by
//! construction: a decrement that drives quantity to zero removes the record
//! in the same call, and matching scans work on a [`snapshot`] copy rather
//! than the live map.
//!
//! [`snapshot`]: OfferRegistry::snapshot

use std::collections::{BTreeMap, HashSet};

use crate::error::{ConstraintError, RegistryError};
use crate::offer::{ActorId, Offer, OfferDraft, OfferId, OfferOrigin};

/// Fields a seller may change through `SELLER_UPDATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferField {
    Price,
    Quantity,
}

impl OfferField {
    /// Parse the wire spelling of an update field.
    pub fn parse(name: &str) -> Result<Self, ConstraintError> {
        match name {
            "price" | "price_per_kwh" => Ok(OfferField::Price),
            "quantity" | "quantity_kwh" => Ok(OfferField::Quantity),
            other => Err(ConstraintError::UnknownField(other.to_string())),
        }
    }
}

/// Result of a successful decrement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decrement {
    /// Quantity left on the offer.
    Remaining(f64),
    /// The decrement consumed the offer; it has been removed and
    /// tombstoned.
    Exhausted,
}

/// In-memory offer map plus the tombstone set that keeps sold-out offers
/// from being resurrected by a stale gossip snapshot.
#[derive(Debug, Default)]
pub struct OfferRegistry {
    offers: BTreeMap<OfferId, Offer>,
    tombstones: HashSet<OfferId>,
    next_serial: u64,
}

impl OfferRegistry {
    pub fn new() -> Self {
        OfferRegistry::default()
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }

    pub fn get(&self, id: &OfferId) -> Option<&Offer> {
        self.offers.get(id)
    }

    /// Allocate an id for a record owned by `owner`. Ids are namespaced by
    /// owner so independently counting peers cannot collide.
    pub fn allocate_id(&mut self, owner: &ActorId) -> OfferId {
        self.next_serial += 1;
        OfferId(format!("{}-{}", owner, self.next_serial))
    }

    /// Register a locally owned offer, allocating its id.
    pub fn register(&mut self, draft: OfferDraft, now_unix: u64) -> Result<OfferId, RegistryError> {
        draft.validate()?;
        let id = self.allocate_id(&draft.owner);
        self.offers.insert(
            id.clone(),
            Offer {
                id: id.clone(),
                owner: draft.owner,
                energy_kind: draft.energy_kind,
                quantity_kwh: draft.quantity_kwh,
                price_per_kwh: draft.price_per_kwh,
                window: draft.window,
                duration_secs: draft.duration_secs,
                created_at: now_unix,
                origin: OfferOrigin::Session,
            },
        );
        Ok(id)
    }

    /// Owner-checked field update.
    pub fn update(
        &mut self,
        id: &OfferId,
        caller: &ActorId,
        field: OfferField,
        value: f64,
    ) -> Result<&Offer, RegistryError> {
        let offer = self
            .offers
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        if &offer.owner != caller {
            return Err(RegistryError::NotOwner(id.clone()));
        }
        match field {
            OfferField::Price => {
                if !(value >= 0.0) {
                    return Err(ConstraintError::NegativePrice.into());
                }
                offer.price_per_kwh = value;
            }
            OfferField::Quantity => {
                if !(value > 0.0) {
                    return Err(ConstraintError::NonPositiveQuantity.into());
                }
                offer.quantity_kwh = value;
            }
        }
        Ok(offer)
    }

    /// Owner-checked removal (`SELLER_EXIT`). Tombstones the id.
    pub fn remove_owned(&mut self, id: &OfferId, caller: &ActorId) -> Result<Offer, RegistryError> {
        match self.offers.get(id) {
            None => return Err(RegistryError::NotFound(id.clone())),
            Some(offer) if &offer.owner != caller => {
                return Err(RegistryError::NotOwner(id.clone()))
            }
            Some(_) => {}
        }
        self.tombstones.insert(id.clone());
        Ok(self.offers.remove(id).unwrap())
    }

    /// Unchecked removal, used when applying replicated exits and trades.
    pub fn remove(&mut self, id: &OfferId) -> Option<Offer> {
        self.tombstones.insert(id.clone());
        self.offers.remove(id)
    }

    /// Atomically decrement an offer's quantity, removing the record in the
    /// same critical section when it reaches zero.
    pub fn decrement(&mut self, id: &OfferId, amount: f64) -> Result<Decrement, RegistryError> {
        let offer = self
            .offers
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        if offer.quantity_kwh < amount {
            return Err(RegistryError::Insufficient {
                id: id.clone(),
                available: offer.quantity_kwh,
                requested: amount,
            });
        }

        offer.quantity_kwh -= amount;
        let remaining = offer.quantity_kwh;
        if remaining <= 0.0 {
            self.offers.remove(id);
            self.tombstones.insert(id.clone());
            Ok(Decrement::Exhausted)
        } else {
            Ok(Decrement::Remaining(remaining))
        }
    }

    /// Point-in-time copy of all records, in stable id order, usable for
    /// lock-free iteration during matching.
    pub fn snapshot(&self) -> Vec<Offer> {
        self.offers.values().cloned().collect()
    }

    /// Apply one replicated record (eager `OFFER_REGISTER` / `OFFER_UPDATE`
    /// gossip). Tombstoned ids are ignored so a sold-out or exited offer is
    /// never resurrected, and a session-owned record is never overwritten:
    /// this node is authoritative for records it originated, and a sync
    /// snapshot echoing our own offer back must not re-key it as remote
    /// (that would hide it from the reaper). Otherwise the incoming copy
    /// wins.
    pub fn apply_remote(&mut self, mut offer: Offer) -> bool {
        if self.tombstones.contains(&offer.id) {
            return false;
        }
        if self
            .offers
            .get(&offer.id)
            .is_some_and(|local| local.origin == OfferOrigin::Session)
        {
            return false;
        }
        offer.origin = OfferOrigin::Remote;
        self.offers.insert(offer.id.clone(), offer);
        true
    }

    /// Last-writer-wins merge of a full `SYNC_RESPONSE` snapshot.
    ///
    /// One-directional: only ids present in the incoming snapshot are set,
    /// local ids absent remotely are untouched, tombstoned ids are skipped.
    /// Applying the same snapshot twice is a no-op.
    pub fn merge_snapshot(&mut self, offers: Vec<Offer>) -> usize {
        let mut applied = 0;
        for offer in offers {
            if self.apply_remote(offer) {
                applied += 1;
            }
        }
        applied
    }

    /// Purge session-origin offers whose owner is not in `live`. Remote
    /// records are the owning peer's to reap, never ours.
    pub fn purge_orphans(&mut self, live: &HashSet<ActorId>) -> Vec<OfferId> {
        let orphaned: Vec<OfferId> = self
            .offers
            .values()
            .filter(|o| o.origin == OfferOrigin::Session && !live.contains(&o.owner))
            .map(|o| o.id.clone())
            .collect();
        for id in &orphaned {
            self.offers.remove(id);
            self.tombstones.insert(id.clone());
        }
        orphaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::TimeWindow;

    fn draft(owner: &str, qty: f64, price: f64) -> OfferDraft {
        OfferDraft {
            owner: ActorId::new(owner),
            energy_kind: "solar".to_string(),
            quantity_kwh: qty,
            price_per_kwh: price,
            window: TimeWindow::parse("09:00", "17:00").unwrap(),
            duration_secs: 3600,
        }
    }

    #[test]
    fn register_allocates_owner_prefixed_ids() {
        let mut reg = OfferRegistry::new();
        let a = reg.register(draft("alice", 10.0, 5.0), 0).unwrap();
        let b = reg.register(draft("alice", 4.0, 6.0), 0).unwrap();

        assert_ne!(a, b);
        assert!(a.as_str().starts_with("alice-"));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn register_rejects_non_positive_quantity() {
        let mut reg = OfferRegistry::new();
        assert!(reg.register(draft("alice", 0.0, 5.0), 0).is_err());
        assert!(reg.register(draft("alice", -1.0, 5.0), 0).is_err());
    }

    #[test]
    fn decrement_removes_exhausted_offer_atomically() {
        let mut reg = OfferRegistry::new();
        let id = reg.register(draft("alice", 10.0, 5.0), 0).unwrap();

        assert_eq!(reg.decrement(&id, 4.0).unwrap(), Decrement::Remaining(6.0));
        assert_eq!(reg.decrement(&id, 6.0).unwrap(), Decrement::Exhausted);
        assert!(reg.get(&id).is_none());
        // Exhausted id is gone for good: no second decrement, no revival.
        assert_eq!(
            reg.decrement(&id, 1.0),
            Err(RegistryError::NotFound(id.clone()))
        );
    }

    #[test]
    fn decrement_never_oversells() {
        let mut reg = OfferRegistry::new();
        let id = reg.register(draft("alice", 5.0, 5.0), 0).unwrap();

        let err = reg.decrement(&id, 7.5).unwrap_err();
        assert!(matches!(err, RegistryError::Insufficient { .. }));
        // Quantity is untouched by the failed attempt.
        assert_eq!(reg.get(&id).unwrap().quantity_kwh, 5.0);
    }

    #[test]
    fn sequential_decrements_conserve_quantity() {
        let mut reg = OfferRegistry::new();
        let id = reg.register(draft("alice", 100.0, 5.0), 0).unwrap();

        let mut sold = 0.0;
        for _ in 0..7 {
            if reg.decrement(&id, 9.0).is_ok() {
                sold += 9.0;
            }
        }
        assert_eq!(reg.get(&id).unwrap().quantity_kwh, 100.0 - sold);
    }

    #[test]
    fn update_is_owner_checked() {
        let mut reg = OfferRegistry::new();
        let id = reg.register(draft("alice", 10.0, 5.0), 0).unwrap();

        let err = reg
            .update(&id, &ActorId::new("mallory"), OfferField::Price, 1.0)
            .unwrap_err();
        assert_eq!(err, RegistryError::NotOwner(id.clone()));

        reg.update(&id, &ActorId::new("alice"), OfferField::Price, 7.5)
            .unwrap();
        assert_eq!(reg.get(&id).unwrap().price_per_kwh, 7.5);
    }

    #[test]
    fn merge_is_idempotent_and_skips_tombstones() {
        let mut reg = OfferRegistry::new();
        let id = reg.register(draft("alice", 10.0, 5.0), 0).unwrap();
        let snapshot = reg.snapshot();

        let mut other = OfferRegistry::new();
        assert_eq!(other.merge_snapshot(snapshot.clone()), 1);
        assert_eq!(other.merge_snapshot(snapshot.clone()), 1);
        assert_eq!(other.len(), 1);
        assert_eq!(other.get(&id).unwrap().origin, OfferOrigin::Remote);

        // Sell out the replicated copy, then replay the stale snapshot: the
        // offer must not come back.
        other.decrement(&id, 10.0).unwrap();
        assert_eq!(other.merge_snapshot(snapshot), 0);
        assert!(other.get(&id).is_none());
    }

    #[test]
    fn echoed_snapshot_does_not_reclassify_own_offers() {
        let mut a = OfferRegistry::new();
        let mut b = OfferRegistry::new();
        let id = a.register(draft("alice", 10.0, 5.0), 0).unwrap();

        // Full sync round trip: A's snapshot reaches B, B's snapshot (now
        // carrying A's offer) comes back to A.
        b.merge_snapshot(a.snapshot());
        a.merge_snapshot(b.snapshot());

        assert_eq!(a.get(&id).unwrap().origin, OfferOrigin::Session);
        assert_eq!(b.get(&id).unwrap().origin, OfferOrigin::Remote);

        // Alice disconnects: her own node still reaps the offer.
        let purged = a.purge_orphans(&HashSet::new());
        assert_eq!(purged, vec![id]);
    }

    #[test]
    fn remote_copy_never_stomps_a_live_local_offer() {
        let mut reg = OfferRegistry::new();
        let id = reg.register(draft("alice", 10.0, 5.0), 0).unwrap();

        let mut stale = reg.get(&id).unwrap().clone();
        stale.quantity_kwh = 99.0;
        assert!(!reg.apply_remote(stale));
        assert_eq!(reg.get(&id).unwrap().quantity_kwh, 10.0);
    }

    #[test]
    fn reaper_purges_only_sessionless_local_offers() {
        let mut reg = OfferRegistry::new();
        let kept = reg.register(draft("alice", 10.0, 5.0), 0).unwrap();
        let orphan = reg.register(draft("bob", 3.0, 2.0), 0).unwrap();

        let mut remote = reg.get(&kept).unwrap().clone();
        remote.id = OfferId("carol-1".to_string());
        remote.owner = ActorId::new("carol");
        reg.apply_remote(remote);

        let live: HashSet<ActorId> = [ActorId::new("alice")].into_iter().collect();
        let purged = reg.purge_orphans(&live);

        assert_eq!(purged, vec![orphan]);
        assert!(reg.get(&kept).is_some());
        // Remote record survives even though carol has no local session.
        assert!(reg.get(&OfferId("carol-1".to_string())).is_some());
    }
}
