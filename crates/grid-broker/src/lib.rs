//! grid-broker
//!
//! Multi-client async TCP broker for the energy-trading network. The peer
//! topology reuses the session, router, and collaborator modules, so they
//! are all public.

pub mod collab;
pub mod config;
pub mod replication;
pub mod router;
pub mod server;
pub mod session;
pub mod types;
