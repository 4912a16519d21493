//! grid-protocol
//!
//! JSON wire messages for the energy-trading network, plus the
//! length-prefixed framing both topologies use on their TCP streams.

pub mod framing;
pub mod wire;

pub use framing::{encode, read_frame, read_message, write_message, FrameError, MAX_FRAME_LEN};
pub use wire::{
    ClientMessage, PeerMessage, Reply, ServerMessage, Status, TradeNotification,
};
