//! Central router task.
//!
//! This task owns the offer registry, the automatic order books, and the
//! session table. Every mutation in the process goes through its event
//! channel, which is the mutual-exclusion discipline: `decrement` and
//! `remove` can never race because only this task touches the maps.
//!
//! Routing policy:
//! - replies go only to the requesting session,
//! - `TRANSACTION_NOTIFICATION`s go to both parties' live sessions,
//!   best-effort: a dead counterparty is logged, never retried, and never
//!   rolls back a committed trade.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use grid_core::auto::{AutoBook, AutoBuyer};
use grid_core::collab::{Authenticator, Hardware, Ledger};
use grid_core::error::{ConstraintError, ExecuteError};
use grid_core::executor::{execute, BuyConstraint, TradeOutcome};
use grid_core::matching::qualifying_offers;
use grid_core::offer::{ActorId, BuyRequest, OfferDraft, OfferId};
use grid_core::registry::{OfferField, OfferRegistry};
use grid_core::trade::{now_unix, TradeRole};
use grid_core::window::TimeWindow;
use grid_protocol::wire::{ClientMessage, PeerMessage, Reply, ServerMessage, Status, TradeNotification};
use tracing::{debug, info, warn};

use crate::replication::Replicator;
use crate::types::{OutboundTx, RouterEvent, RouterRx, SessionId};

/// Collaborators and topology hooks injected at startup. There is no hidden
/// module-level state: everything the router touches lives here or in its
/// own fields.
pub struct Deps {
    pub authenticator: Arc<dyn Authenticator>,
    pub ledger: Arc<dyn Ledger>,
    pub hardware: Arc<dyn Hardware>,
    pub replicator: Arc<dyn Replicator>,
}

impl Deps {
    /// Open-auth, no-op collaborators. For tests and demos.
    pub fn open() -> Self {
        Deps {
            authenticator: Arc::new(grid_core::collab::OpenAuthenticator),
            ledger: Arc::new(grid_core::collab::NullLedger),
            hardware: Arc::new(grid_core::collab::NoopHardware),
            replicator: Arc::new(crate::replication::NoReplication),
        }
    }
}

struct SessionEntry {
    actor: ActorId,
    tx: OutboundTx,
}

struct Router {
    registry: OfferRegistry,
    book: AutoBook,
    sessions: HashMap<SessionId, SessionEntry>,
    by_actor: HashMap<ActorId, SessionId>,
    deps: Arc<Deps>,
}

/// Run the central routing loop until every event sender is gone.
pub async fn run_router(mut rx: RouterRx, deps: Arc<Deps>) {
    let mut router = Router {
        registry: OfferRegistry::new(),
        book: AutoBook::new(),
        sessions: HashMap::new(),
        by_actor: HashMap::new(),
        deps,
    };

    while let Some(event) = rx.recv().await {
        router.handle_event(event);
    }

    info!("router shutting down (event channel closed)");
}

impl Router {
    fn handle_event(&mut self, event: RouterEvent) {
        match event {
            RouterEvent::Connected { session, actor, tx } => {
                debug!(%session, %actor, "session bound");
                // Same actor on a fresh connection: the newer session wins
                // notification routing. The older session stays in the
                // table so its requests keep getting synchronous replies
                // until it disconnects on its own.
                if let Some(previous) = self.by_actor.insert(actor.clone(), session) {
                    debug!(%previous, %actor, "notification routing moved to newer session");
                }
                self.sessions.insert(session, SessionEntry { actor, tx });
            }
            RouterEvent::Request { session, msg } => {
                let Some(entry) = self.sessions.get(&session) else {
                    debug!(%session, "request from unbound session dropped");
                    return;
                };
                let actor = entry.actor.clone();
                let reply = self.handle_request(&actor, msg);
                self.reply_to(session, reply);
            }
            RouterEvent::Disconnected { session } => {
                if let Some(entry) = self.sessions.remove(&session) {
                    debug!(%session, actor = %entry.actor, "session closed");
                    if self.by_actor.get(&entry.actor) == Some(&session) {
                        self.by_actor.remove(&entry.actor);
                    }
                }
                // Records stay until the reaper's next pass; the lazy
                // cleanup window tolerates transient handler races.
            }
            RouterEvent::Peer(msg) => self.handle_gossip(msg),
            RouterEvent::ReapTick => self.reap(),
        }
    }

    fn reply_to(&self, session: SessionId, reply: Reply) {
        if let Some(entry) = self.sessions.get(&session) {
            let _ = entry.tx.send(ServerMessage::Reply(reply));
        }
    }

    fn handle_request(&mut self, actor: &ActorId, msg: ClientMessage) -> Reply {
        match msg {
            ClientMessage::Auth { .. } => Reply::error("already authenticated"),
            ClientMessage::SellerRegister {
                energy_kind,
                quantity_kwh,
                price_per_kwh,
                window_start,
                window_end,
                duration_secs,
            } => self.seller_register(
                actor,
                energy_kind,
                quantity_kwh,
                price_per_kwh,
                &window_start,
                &window_end,
                duration_secs,
                false,
            ),
            ClientMessage::AutoSeller {
                energy_kind,
                quantity_kwh,
                limit_price,
                window_start,
                window_end,
                duration_secs,
            } => self.seller_register(
                actor,
                energy_kind,
                quantity_kwh,
                limit_price,
                &window_start,
                &window_end,
                duration_secs,
                true,
            ),
            ClientMessage::SellerUpdate {
                offer_id,
                field,
                value,
            } => self.seller_update(actor, &offer_id, &field, value),
            ClientMessage::SellerExit { offer_id } => self.seller_exit(actor, &offer_id),
            ClientMessage::BuyerRequest {
                quantity_kwh,
                window_start,
                window_end,
                duration_secs,
            } => self.buyer_request(actor, quantity_kwh, &window_start, &window_end, duration_secs),
            ClientMessage::Transaction {
                offer_id,
                quantity_kwh,
                window_start,
                window_end,
                duration_secs,
            } => self.transaction(
                actor,
                &offer_id,
                quantity_kwh,
                window_start.as_deref(),
                window_end.as_deref(),
                duration_secs,
            ),
            ClientMessage::AutoBuyer {
                quantity_kwh,
                limit_price,
                window_start,
                window_end,
                duration_secs,
            } => self.auto_buyer(actor, quantity_kwh, limit_price, &window_start, &window_end, duration_secs),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn seller_register(
        &mut self,
        actor: &ActorId,
        energy_kind: String,
        quantity_kwh: f64,
        price_per_kwh: f64,
        window_start: &str,
        window_end: &str,
        duration_secs: u32,
        automatic: bool,
    ) -> Reply {
        let window = match TimeWindow::parse(window_start, window_end) {
            Ok(window) => window,
            Err(e) => return Reply::error(e.to_string()),
        };
        let draft = OfferDraft {
            owner: actor.clone(),
            energy_kind,
            quantity_kwh,
            price_per_kwh,
            window,
            duration_secs,
        };
        let id = match self.registry.register(draft, now_unix()) {
            Ok(id) => id,
            Err(e) => return Reply::error(e.to_string()),
        };

        let offer = self.registry.get(&id).cloned();
        if let Some(offer) = offer {
            self.deps.replicator.offer_registered(&offer);
        }

        if automatic {
            info!(%actor, %id, quantity_kwh, limit = price_per_kwh, "auto seller registered");
            self.book.insert_seller(id.clone());
            self.run_auto_matches();
            Reply::status(Status::AutoSellerRegistered).with_offer_id(id)
        } else {
            info!(%actor, %id, quantity_kwh, price_per_kwh, "seller registered");
            Reply::status(Status::SellerRegistered).with_offer_id(id)
        }
    }

    fn seller_update(&mut self, actor: &ActorId, id: &OfferId, field: &str, value: f64) -> Reply {
        let field = match OfferField::parse(field) {
            Ok(field) => field,
            Err(e) => return Reply::error(e.to_string()),
        };
        match self.registry.update(id, actor, field, value) {
            Ok(offer) => {
                let offer = offer.clone();
                info!(%actor, %id, ?field, value, "offer updated");
                self.deps.replicator.offer_updated(&offer);
                // A price or quantity change can unlock pending auto buyers.
                self.run_auto_matches();
                Reply::status(Status::Updated).with_message(format!("{id} updated"))
            }
            Err(e) => Reply::error(e.to_string()),
        }
    }

    fn seller_exit(&mut self, actor: &ActorId, id: &OfferId) -> Reply {
        match self.registry.remove_owned(id, actor) {
            Ok(_) => {
                info!(%actor, %id, "seller exited");
                self.book.remove(id);
                self.deps.replicator.offer_removed(id);
                return Reply::status(Status::Removed).with_message(format!("{id} removed"));
            }
            Err(grid_core::RegistryError::NotFound(_)) => {}
            Err(e) => return Reply::error(e.to_string()),
        }

        // Not a registry offer: it may be a standing auto-buyer order.
        let owns_order = self
            .book
            .pending_buyers()
            .iter()
            .any(|b| &b.id == id && &b.owner == actor);
        if owns_order && self.book.remove(id) {
            info!(%actor, %id, "auto buyer order cancelled");
            Reply::status(Status::Removed).with_message(format!("{id} removed"))
        } else {
            Reply::error(format!("offer {id} not found"))
        }
    }

    fn buyer_request(
        &mut self,
        actor: &ActorId,
        quantity_kwh: f64,
        window_start: &str,
        window_end: &str,
        duration_secs: u32,
    ) -> Reply {
        let window = match TimeWindow::parse(window_start, window_end) {
            Ok(window) => window,
            Err(e) => return Reply::error(e.to_string()),
        };
        let request = BuyRequest {
            requester: actor.clone(),
            quantity_kwh,
            window,
            duration_secs,
        };
        // Scan a point-in-time copy, never the live map.
        let hits = qualifying_offers(&self.registry.snapshot(), &request);
        debug!(%actor, quantity_kwh, hits = hits.len(), "buyer query");
        Reply::status(Status::Ok).with_sellers(hits)
    }

    fn transaction(
        &mut self,
        actor: &ActorId,
        offer_id: &OfferId,
        quantity_kwh: f64,
        window_start: Option<&str>,
        window_end: Option<&str>,
        duration_secs: Option<u32>,
    ) -> Reply {
        let constraint = match (window_start, window_end) {
            (Some(start), Some(end)) => match TimeWindow::parse(start, end) {
                Ok(window) => Some(BuyConstraint {
                    window,
                    duration_secs: duration_secs.unwrap_or(0),
                }),
                Err(e) => return Reply::error(e.to_string()),
            },
            (None, None) => None,
            _ => return Reply::error("window_start and window_end must be supplied together"),
        };

        match execute(&mut self.registry, actor, offer_id, quantity_kwh, constraint) {
            Ok(outcome) => {
                let remaining = outcome.remaining_kwh;
                self.settle(&outcome);
                Reply::status(Status::TransactionSuccess).with_remaining(remaining)
            }
            Err(e @ ExecuteError::NotFound(_)) => Reply::error(e.to_string()),
            Err(e @ ExecuteError::Constraint(_)) => Reply::error(e.to_string()),
            Err(e) => {
                debug!(%actor, %offer_id, error = %e, "transaction refused");
                Reply::status(Status::TransactionFailed).with_message(e.to_string())
            }
        }
    }

    fn auto_buyer(
        &mut self,
        actor: &ActorId,
        quantity_kwh: f64,
        limit_price: f64,
        window_start: &str,
        window_end: &str,
        duration_secs: u32,
    ) -> Reply {
        let window = match TimeWindow::parse(window_start, window_end) {
            Ok(window) => window,
            Err(e) => return Reply::error(e.to_string()),
        };
        if !(quantity_kwh > 0.0) {
            return Reply::error(ConstraintError::NonPositiveQuantity.to_string());
        }
        if !(limit_price >= 0.0) {
            return Reply::error(ConstraintError::NegativePrice.to_string());
        }
        let id = self.registry.allocate_id(actor);
        info!(%actor, %id, quantity_kwh, limit = limit_price, "auto buyer registered");
        self.book.insert_buyer(AutoBuyer {
            id: id.clone(),
            owner: actor.clone(),
            quantity_kwh,
            limit_price,
            window,
            duration_secs,
        });
        self.run_auto_matches();
        Reply::status(Status::AutoBuyerRegistered).with_offer_id(id)
    }

    /// Re-run the greedy pass and settle everything it matched.
    fn run_auto_matches(&mut self) {
        let outcomes = self.book.run_matches(&mut self.registry);
        for outcome in outcomes {
            self.settle(&outcome);
        }
    }

    /// Post-commit bookkeeping for one trade: ledger rows, both parties'
    /// notifications, hardware pulses, replication.
    fn settle(&mut self, outcome: &TradeOutcome) {
        info!(
            buyer = %outcome.buyer,
            seller = %outcome.seller,
            offer = %outcome.offer_id,
            quantity_kwh = outcome.quantity_kwh,
            price_per_kwh = outcome.price_per_kwh,
            "trade executed"
        );

        let record = outcome.record();
        self.deps.ledger.append(&outcome.buyer, &record);
        self.deps.ledger.append(&outcome.seller, &record);

        self.notify_party(&outcome.buyer, TradeRole::Buyer, &outcome.seller, outcome);
        self.notify_party(&outcome.seller, TradeRole::Seller, &outcome.buyer, outcome);

        self.deps.replicator.trade_executed(outcome);
    }

    fn notify_party(
        &self,
        party: &ActorId,
        role: TradeRole,
        counterparty: &ActorId,
        outcome: &TradeOutcome,
    ) {
        let Some(session) = self.by_actor.get(party) else {
            debug!(%party, "party has no live session, notification skipped");
            return;
        };
        let Some(entry) = self.sessions.get(session) else {
            return;
        };
        let push = ServerMessage::Notification(TradeNotification {
            role,
            counterparty: counterparty.clone(),
            offer_id: outcome.offer_id.clone(),
            quantity_kwh: outcome.quantity_kwh,
            price_per_kwh: outcome.price_per_kwh,
            duration_secs: outcome.duration_secs,
        });
        if entry.tx.send(push).is_err() {
            warn!(%party, "notification push failed (session gone)");
        }
        self.deps.hardware.notify(role, outcome.duration_secs);
    }

    /// Apply one gossip message (peer topology only).
    fn handle_gossip(&mut self, msg: PeerMessage) {
        match msg {
            PeerMessage::SyncRequest {
                from_host,
                from_port,
            } => {
                self.deps.replicator.snapshot_requested(
                    &from_host,
                    from_port,
                    self.registry.snapshot(),
                );
            }
            PeerMessage::SyncResponse { offers } => {
                let applied = self.registry.merge_snapshot(offers);
                debug!(applied, "merged sync snapshot");
            }
            PeerMessage::OfferRegister { offer } | PeerMessage::OfferUpdate { offer } => {
                let id = offer.id.clone();
                if self.registry.apply_remote(offer) {
                    debug!(%id, "replicated offer applied");
                }
            }
            PeerMessage::OfferExit { offer_id } => {
                self.registry.remove(&offer_id);
                debug!(%offer_id, "replicated exit applied");
            }
            PeerMessage::Trade {
                offer_id,
                buyer,
                seller,
                quantity_kwh,
                price_per_kwh,
                duration_secs,
            } => {
                match self.registry.decrement(&offer_id, quantity_kwh) {
                    Ok(_) => debug!(%offer_id, quantity_kwh, "replicated trade applied"),
                    // Already gone here (raced with a sync or a local sale);
                    // the executing peer holds the authoritative state.
                    Err(e) => debug!(%offer_id, error = %e, "replicated trade skipped"),
                }
                let outcome = TradeOutcome {
                    offer_id,
                    buyer: buyer.clone(),
                    seller: seller.clone(),
                    quantity_kwh,
                    price_per_kwh,
                    duration_secs,
                    remaining_kwh: None,
                    executed_at: now_unix(),
                };
                // Notify whichever party lives on this node; the executing
                // peer already told its own locals.
                if self.by_actor.contains_key(&buyer) {
                    self.notify_party(&buyer, TradeRole::Buyer, &seller, &outcome);
                }
                if self.by_actor.contains_key(&seller) {
                    self.notify_party(&seller, TradeRole::Seller, &buyer, &outcome);
                }
            }
        }
    }

    /// Purge records whose owning session is gone. Bounded staleness: a
    /// record may outlive its connection by up to one reap interval.
    fn reap(&mut self) {
        let live: HashSet<ActorId> = self
            .sessions
            .values()
            .map(|entry| entry.actor.clone())
            .collect();

        let purged_offers = self.registry.purge_orphans(&live);
        let purged_orders = self.book.purge_orphans(&live, &self.registry);

        for id in &purged_offers {
            self.deps.replicator.offer_removed(id);
        }
        if !purged_offers.is_empty() || !purged_orders.is_empty() {
            info!(
                offers = purged_offers.len(),
                orders = purged_orders.len(),
                "reaper purged orphaned records"
            );
        }
    }
}
