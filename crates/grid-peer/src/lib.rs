//! grid-peer
//!
//! Decentralized gossip node: broker-style client sessions plus a
//! pull-based anti-entropy synchronizer with eager broadcast.

pub mod config;
pub mod gossip;
pub mod server;
