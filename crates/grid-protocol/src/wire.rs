//! Logical wire messages.
//!
//! Every message is one JSON object with a `type` tag drawn from a closed
//! set; replies carry a `status` field instead. Structured decoding into
//! these enums is a correctness requirement: nothing on the receive path
//! ever evaluates untrusted text.
//!
//! Three families:
//! - [`ClientMessage`]: client → broker/peer requests.
//! - [`ServerMessage`]: broker/peer → client, either a [`Reply`] to the one
//!   outstanding synchronous request or a pushed [`TradeNotification`].
//! - [`PeerMessage`]: peer ↔ peer gossip, one message per connection.

use serde::{Deserialize, Serialize};

use grid_core::offer::{ActorId, Offer, OfferId};
use grid_core::trade::TradeRole;

/// Requests a client may send after connecting. `Auth` must come first;
/// everything else on an unauthenticated session is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "AUTH")]
    Auth { username: String, password: String },

    #[serde(rename = "SELLER_REGISTER")]
    SellerRegister {
        energy_kind: String,
        quantity_kwh: f64,
        price_per_kwh: f64,
        window_start: String,
        window_end: String,
        duration_secs: u32,
    },

    #[serde(rename = "SELLER_UPDATE")]
    SellerUpdate {
        offer_id: OfferId,
        field: String,
        value: f64,
    },

    #[serde(rename = "SELLER_EXIT")]
    SellerExit { offer_id: OfferId },

    #[serde(rename = "BUYER_REQUEST")]
    BuyerRequest {
        quantity_kwh: f64,
        window_start: String,
        window_end: String,
        duration_secs: u32,
    },

    /// Commit a purchase against a previously listed offer. The window
    /// fields are optional; when present they are re-validated at commit
    /// time.
    #[serde(rename = "TRANSACTION")]
    Transaction {
        offer_id: OfferId,
        quantity_kwh: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window_start: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window_end: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_secs: Option<u32>,
    },

    #[serde(rename = "AUTO_SELLER")]
    AutoSeller {
        energy_kind: String,
        quantity_kwh: f64,
        /// Minimum acceptable price per kWh.
        limit_price: f64,
        window_start: String,
        window_end: String,
        duration_secs: u32,
    },

    #[serde(rename = "AUTO_BUYER")]
    AutoBuyer {
        quantity_kwh: f64,
        /// Maximum acceptable price per kWh.
        limit_price: f64,
        window_start: String,
        window_end: String,
        duration_secs: u32,
    },
}

/// Reply statuses. The wire spellings are load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "AUTH_SUCCESS")]
    AuthSuccess,
    #[serde(rename = "AUTH_FAILED")]
    AuthFailed,
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "seller_registered")]
    SellerRegistered,
    #[serde(rename = "auto_seller_registered")]
    AutoSellerRegistered,
    #[serde(rename = "auto_buyer_registered")]
    AutoBuyerRegistered,
    #[serde(rename = "updated")]
    Updated,
    #[serde(rename = "removed")]
    Removed,
    #[serde(rename = "transaction_success")]
    TransactionSuccess,
    #[serde(rename = "transaction_failed")]
    TransactionFailed,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "invalid_format")]
    InvalidFormat,
    #[serde(rename = "unknown_command")]
    UnknownCommand,
}

/// Synchronous response to exactly one client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_id: Option<OfferId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_kwh: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_sellers: Option<Vec<Offer>>,
}

impl Reply {
    pub fn status(status: Status) -> Self {
        Reply {
            status,
            message: None,
            offer_id: None,
            remaining_kwh: None,
            available_sellers: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Reply {
            message: Some(message.into()),
            ..Reply::status(Status::Error)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_offer_id(mut self, id: OfferId) -> Self {
        self.offer_id = Some(id);
        self
    }

    pub fn with_remaining(mut self, remaining: Option<f64>) -> Self {
        self.remaining_kwh = remaining;
        self
    }

    pub fn with_sellers(mut self, sellers: Vec<Offer>) -> Self {
        self.available_sellers = Some(sellers);
        self
    }
}

/// Pushed to both parties of a completed trade. Carries a `type` tag so the
/// client can tell it apart from the reply it may be waiting for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "TRANSACTION_NOTIFICATION")]
pub struct TradeNotification {
    pub role: TradeRole,
    pub counterparty: ActorId,
    pub offer_id: OfferId,
    pub quantity_kwh: f64,
    pub price_per_kwh: f64,
    pub duration_secs: u32,
}

/// Anything a broker or peer sends to a connected client.
///
/// Untagged on the wire: notifications carry `type`, replies carry
/// `status`, so the shapes are disjoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Notification(TradeNotification),
    Reply(Reply),
}

/// Peer ↔ peer gossip. One-shot connections: open, send one frame, close.
///
/// The replicated payloads carry whole [`Offer`] records; the receiving
/// registry re-keys their origin, so a gossiped copy can never pose as a
/// session-owned record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PeerMessage {
    /// Pull request of the periodic anti-entropy loop; the recipient
    /// connects back to `from_host:from_port` with a `SYNC_RESPONSE`.
    #[serde(rename = "SYNC_REQUEST")]
    SyncRequest { from_host: String, from_port: u16 },

    /// Full offer snapshot, merged last-writer-wins by the requester.
    #[serde(rename = "SYNC_RESPONSE")]
    SyncResponse { offers: Vec<Offer> },

    /// Eager broadcast of a new local offer.
    #[serde(rename = "OFFER_REGISTER")]
    OfferRegister { offer: Offer },

    /// Eager broadcast of an owner update.
    #[serde(rename = "OFFER_UPDATE")]
    OfferUpdate { offer: Offer },

    /// Eager broadcast of an owner exit.
    #[serde(rename = "OFFER_EXIT")]
    OfferExit { offer_id: OfferId },

    /// Eager broadcast of an executed trade so replicas decrement too.
    #[serde(rename = "TRADE")]
    Trade {
        offer_id: OfferId,
        buyer: ActorId,
        seller: ActorId,
        quantity_kwh: f64,
        price_per_kwh: f64,
        duration_secs: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_tags_match_the_protocol() {
        let msg = ClientMessage::Auth {
            username: "alice".to_string(),
            password: "pw".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "AUTH");

        let msg = ClientMessage::SellerRegister {
            energy_kind: "solar".to_string(),
            quantity_kwh: 10.0,
            price_per_kwh: 5.0,
            window_start: "09:00".to_string(),
            window_end: "17:00".to_string(),
            duration_secs: 3600,
        };
        assert_eq!(serde_json::to_value(&msg).unwrap()["type"], "SELLER_REGISTER");
    }

    #[test]
    fn statuses_use_the_wire_spellings() {
        assert_eq!(
            serde_json::to_string(&Status::AuthSuccess).unwrap(),
            "\"AUTH_SUCCESS\""
        );
        assert_eq!(
            serde_json::to_string(&Status::TransactionFailed).unwrap(),
            "\"transaction_failed\""
        );
        assert_eq!(
            serde_json::to_string(&Status::InvalidFormat).unwrap(),
            "\"invalid_format\""
        );
    }

    #[test]
    fn reply_omits_empty_fields() {
        let json = serde_json::to_string(&Reply::status(Status::Removed)).unwrap();
        assert_eq!(json, r#"{"status":"removed"}"#);
    }

    #[test]
    fn server_message_disambiguates_reply_from_notification() {
        let reply = r#"{"status":"transaction_success","remaining_kwh":5.0}"#;
        assert!(matches!(
            serde_json::from_str::<ServerMessage>(reply).unwrap(),
            ServerMessage::Reply(_)
        ));

        let push = r#"{
            "type": "TRANSACTION_NOTIFICATION",
            "role": "buyer",
            "counterparty": "alice",
            "offer_id": "alice-1",
            "quantity_kwh": 5.0,
            "price_per_kwh": 5.0,
            "duration_secs": 3600
        }"#;
        let decoded = serde_json::from_str::<ServerMessage>(push).unwrap();
        let ServerMessage::Notification(n) = decoded else {
            panic!("expected notification, got {:?}", decoded);
        };
        assert_eq!(n.role, TradeRole::Buyer);
        assert_eq!(n.counterparty, ActorId::new("alice"));
    }

    #[test]
    fn gossip_and_client_frames_are_distinguishable() {
        // A peer listener classifies a connection by whether the first
        // frame decodes as gossip.
        let sync = r#"{"type":"SYNC_REQUEST","from_host":"10.0.0.2","from_port":5000}"#;
        assert!(serde_json::from_str::<PeerMessage>(sync).is_ok());

        let auth = r#"{"type":"AUTH","username":"alice","password":"pw"}"#;
        assert!(serde_json::from_str::<PeerMessage>(auth).is_err());
        assert!(serde_json::from_str::<ClientMessage>(auth).is_ok());
    }
}
