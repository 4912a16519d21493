//! Production implementations of the collaborator contracts.
//!
//! Authentication reads a JSON credentials file once at startup; the ledger
//! appends JSON lines; the hardware hook just logs (the reference
//! deployment pulses an LED here). All failures are logged and swallowed;
//! none of these may affect trade correctness.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use grid_core::collab::{Authenticator, Hardware, Ledger, MemoryAuthenticator};
use grid_core::offer::ActorId;
use grid_core::trade::{TradeRecord, TradeRole};
use tracing::{info, warn};

/// Load a `{"username": "password"}` JSON file into an in-memory table.
pub fn load_credentials(path: &Path) -> anyhow::Result<MemoryAuthenticator> {
    let raw = std::fs::read_to_string(path)?;
    let table: HashMap<String, String> = serde_json::from_str(&raw)?;
    info!(users = table.len(), file = %path.display(), "loaded credentials");
    Ok(MemoryAuthenticator::new(table))
}

/// Append-only JSON-lines trade ledger. One line per party per trade.
pub struct JsonlLedger {
    file: Mutex<File>,
}

impl JsonlLedger {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(JsonlLedger {
            file: Mutex::new(file),
        })
    }
}

impl Ledger for JsonlLedger {
    fn append(&self, actor: &ActorId, record: &TradeRecord) {
        let row = match serde_json::to_string(&LedgerRow { actor, record }) {
            Ok(row) => row,
            Err(e) => {
                warn!(%actor, error = %e, "ledger row did not serialize");
                return;
            }
        };
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(file, "{}", row) {
            warn!(%actor, error = %e, "ledger append failed");
        }
    }
}

#[derive(serde::Serialize)]
struct LedgerRow<'a> {
    actor: &'a ActorId,
    record: &'a TradeRecord,
}

/// Hardware hook that logs instead of driving a GPIO pin.
#[derive(Debug, Default)]
pub struct LogHardware;

impl Hardware for LogHardware {
    fn notify(&self, role: TradeRole, duration_secs: u32) {
        info!(%role, duration_secs, "hardware pulse");
    }
}

/// Choose an authenticator from config: a credentials file if present,
/// otherwise the open policy.
pub fn authenticator_from(path: Option<&Path>) -> anyhow::Result<std::sync::Arc<dyn Authenticator>> {
    match path {
        Some(path) => Ok(std::sync::Arc::new(load_credentials(path)?)),
        None => {
            warn!("no credentials file configured; any non-empty username authenticates");
            Ok(std::sync::Arc::new(grid_core::collab::OpenAuthenticator))
        }
    }
}

/// Choose a ledger from config: a JSON-lines file if present, otherwise
/// drop records.
pub fn ledger_from(path: Option<&Path>) -> anyhow::Result<std::sync::Arc<dyn Ledger>> {
    match path {
        Some(path) => Ok(std::sync::Arc::new(JsonlLedger::open(path)?)),
        None => Ok(std::sync::Arc::new(grid_core::collab::NullLedger)),
    }
}
