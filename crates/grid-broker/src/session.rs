//! Per-connection session task.
//!
//! One task per accepted TCP connection. The protocol is strict: the first
//! message must be `AUTH`, checked against the authenticator collaborator;
//! until it succeeds every other message gets an `error` reply and is not
//! processed. After authentication the session binds its actor identity to
//! the router and pumps decoded messages into it.
//!
//! A malformed frame gets `invalid_format` and the connection stays open; a
//! well-formed frame with an unknown tag gets `unknown_command`. Only EOF
//! or a transport error tears the session down, and even then its records
//! linger until the reaper's next pass.

use std::sync::Arc;

use anyhow::Result;
use grid_core::collab::Authenticator;
use grid_core::offer::ActorId;
use grid_protocol::framing::{read_frame, write_message};
use grid_protocol::wire::{ClientMessage, Reply, ServerMessage, Status};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::types::{RouterEvent, RouterTx, SessionId};

/// Run the I/O loop for one connection.
///
/// `initial_frame` lets a listener that already consumed the first frame
/// (the peer topology classifies connections by it) hand the frame over
/// instead of losing it.
pub async fn run_session(
    session: SessionId,
    stream: TcpStream,
    router_tx: RouterTx,
    authenticator: Arc<dyn Authenticator>,
    initial_frame: Option<Vec<u8>>,
) -> Result<()> {
    let (mut read_half, write_half) = stream.into_split();

    // Writer task: drains replies and pushed notifications, in order.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let writer = tokio::spawn(async move {
        let mut write_half = write_half;
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = write_message(&mut write_half, &msg).await {
                debug!(error = %e, "session write failed");
                break;
            }
        }
    });

    let mut authed: Option<ActorId> = None;
    let mut pending = initial_frame;

    loop {
        let frame = match pending.take() {
            Some(frame) => frame,
            None => match read_frame(&mut read_half).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    debug!(%session, error = %e, "session read failed");
                    break;
                }
            },
        };

        let msg: ClientMessage = match serde_json::from_slice(&frame) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(%session, error = %e, "undecodable message");
                let status = match serde_json::from_slice::<serde_json::Value>(&frame) {
                    // Valid JSON whose tag is outside the closed set.
                    Ok(v) if v.get("type").and_then(|t| t.as_str()).is_some_and(unknown_tag) => {
                        Status::UnknownCommand
                    }
                    // Known tag with broken fields, or not JSON at all.
                    _ => Status::InvalidFormat,
                };
                let _ = out_tx.send(ServerMessage::Reply(Reply::status(status)));
                continue;
            }
        };

        match (&authed, msg) {
            (None, ClientMessage::Auth { username, password }) => {
                if authenticator.authenticate(&username, &password) {
                    let actor = ActorId::new(username);
                    debug!(%session, %actor, "authenticated");
                    authed = Some(actor.clone());
                    let _ = router_tx.send(RouterEvent::Connected {
                        session,
                        actor,
                        tx: out_tx.clone(),
                    });
                    let _ = out_tx.send(ServerMessage::Reply(Reply::status(Status::AuthSuccess)));
                } else {
                    warn!(%session, %username, "authentication failed");
                    let _ = out_tx.send(ServerMessage::Reply(Reply::status(Status::AuthFailed)));
                }
            }
            (None, _) => {
                let _ = out_tx.send(ServerMessage::Reply(Reply::error(
                    "authenticate first (send AUTH)",
                )));
            }
            (Some(_), msg) => {
                if router_tx.send(RouterEvent::Request { session, msg }).is_err() {
                    warn!(%session, "router gone, closing session");
                    break;
                }
            }
        }
    }

    if authed.is_some() {
        let _ = router_tx.send(RouterEvent::Disconnected { session });
    }
    drop(out_tx);
    let _ = writer.await;
    Ok(())
}

const CLIENT_TAGS: &[&str] = &[
    "AUTH",
    "SELLER_REGISTER",
    "SELLER_UPDATE",
    "SELLER_EXIT",
    "BUYER_REQUEST",
    "TRANSACTION",
    "AUTO_SELLER",
    "AUTO_BUYER",
];

fn unknown_tag(tag: &str) -> bool {
    !CLIENT_TAGS.contains(&tag)
}
