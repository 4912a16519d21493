//! Shared types for the broker's session and router tasks.
//!
//! - `SessionId`: a lightweight handle for connected sessions
//! - channel aliases between sessions and the router task
//! - `RouterEvent`: everything that flows into the router

use grid_core::offer::ActorId;
use grid_protocol::{ClientMessage, PeerMessage, ServerMessage};
use tokio::sync::mpsc;

/// Identifier for a connected session. Opaque; unique for the lifetime of
/// the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Outbound messages from the router to one session's writer task. Replies
/// and pushed notifications share this channel, in order.
pub type OutboundTx = mpsc::UnboundedSender<ServerMessage>;
pub type OutboundRx = mpsc::UnboundedReceiver<ServerMessage>;

/// Everything the router task reacts to.
///
/// All registry and book mutations funnel through this one channel, which
/// is what serializes them: the router task is the single writer.
#[derive(Debug)]
pub enum RouterEvent {
    /// A session finished authentication and is ready for traffic.
    Connected {
        session: SessionId,
        actor: ActorId,
        tx: OutboundTx,
    },

    /// An authenticated request.
    Request {
        session: SessionId,
        msg: ClientMessage,
    },

    /// The session's connection closed (EOF or error). Its records stay
    /// until the next reaper pass.
    Disconnected { session: SessionId },

    /// One gossip message from another peer (peer topology only).
    Peer(PeerMessage),

    /// Periodic reaper tick: purge records of dead sessions.
    ReapTick,
}

/// Channel from sessions (and background tasks) into the router.
pub type RouterTx = mpsc::UnboundedSender<RouterEvent>;
pub type RouterRx = mpsc::UnboundedReceiver<RouterEvent>;
