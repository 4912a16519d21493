//! Contracts for the external collaborators the trading core consumes.
//!
//! Only the interfaces live here; the deployments wire in real
//! implementations (credentials file, JSON-lines ledger, hardware
//! actuators). None of these influence matching or synchronization
//! correctness: auth yields a pass/fail, the ledger is append-only, the
//! hardware hook is fire-and-forget.

use crate::offer::ActorId;
use crate::trade::{TradeRecord, TradeRole};

/// Credential check. Policy and storage are the implementation's business;
/// the core only consumes the verdict.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, username: &str, password: &str) -> bool;
}

/// Durable trade log. One append per party per trade; failures are logged
/// by the implementation and never fail the trade.
pub trait Ledger: Send + Sync {
    fn append(&self, actor: &ActorId, record: &TradeRecord);
}

/// Physical signal on trade completion (LED pulse in the reference
/// hardware). Fire-and-forget.
pub trait Hardware: Send + Sync {
    fn notify(&self, role: TradeRole, duration_secs: u32);
}

/// In-memory credential table. The production credentials file loads into
/// one of these.
#[derive(Debug, Default)]
pub struct MemoryAuthenticator {
    credentials: std::collections::HashMap<String, String>,
}

impl MemoryAuthenticator {
    pub fn new(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        MemoryAuthenticator {
            credentials: pairs.into_iter().collect(),
        }
    }
}

impl Authenticator for MemoryAuthenticator {
    fn authenticate(&self, username: &str, password: &str) -> bool {
        self.credentials.get(username).map(String::as_str) == Some(password)
    }
}

/// Accepts any non-empty username. For test rigs and open demo networks.
#[derive(Debug, Default)]
pub struct OpenAuthenticator;

impl Authenticator for OpenAuthenticator {
    fn authenticate(&self, username: &str, _password: &str) -> bool {
        !username.is_empty()
    }
}

/// Ledger that drops everything.
#[derive(Debug, Default)]
pub struct NullLedger;

impl Ledger for NullLedger {
    fn append(&self, _actor: &ActorId, _record: &TradeRecord) {}
}

/// Hardware hook that does nothing.
#[derive(Debug, Default)]
pub struct NoopHardware;

impl Hardware for NoopHardware {
    fn notify(&self, _role: TradeRole, _duration_secs: u32) {}
}
