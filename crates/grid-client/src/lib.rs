//! grid-client
//!
//! Client library for talking to a broker or peer node. Handles framing,
//! the AUTH handshake, and the reply-versus-notification split so callers
//! (and the integration tests) can drive the protocol without any console
//! interaction.

mod connection;

pub use connection::GridConnection;
