//! Connection to a broker or peer node.
//!
//! The protocol allows one outstanding synchronous request per connection,
//! but the node may push `TRANSACTION_NOTIFICATION`s at any time. A
//! background read task splits the inbound stream: notifications go to
//! their own channel immediately, replies queue for the single pending
//! `request` call. That keeps request/response pairs from ever interleaving
//! with pushed events.

use anyhow::{anyhow, Result};
use bytes::{BufMut, BytesMut};
use grid_protocol::framing::read_message;
use grid_protocol::wire::{ClientMessage, Reply, ServerMessage, Status, TradeNotification};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// Default patience for one synchronous round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct GridConnection {
    write_half: OwnedWriteHalf,
    write_buffer: BytesMut,
    replies: UnboundedReceiver<Reply>,
    notifications: UnboundedReceiver<TradeNotification>,
    request_timeout: Duration,
}

impl GridConnection {
    /// Connect and spawn the background read task.
    pub async fn connect(addr: &str) -> Result<Self> {
        debug!(addr, "connecting");
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (mut read_half, write_half) = stream.into_split();

        let (reply_tx, replies) = unbounded_channel();
        let (notif_tx, notifications) = unbounded_channel();

        tokio::spawn(async move {
            loop {
                match read_message::<_, ServerMessage>(&mut read_half).await {
                    Ok(Some(ServerMessage::Notification(n))) => {
                        // Processed immediately, never queued behind a
                        // pending reply.
                        if notif_tx.send(n).is_err() {
                            break;
                        }
                    }
                    Ok(Some(ServerMessage::Reply(reply))) => {
                        if reply_tx.send(reply).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("server closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "read loop failed");
                        break;
                    }
                }
            }
        });

        Ok(GridConnection {
            write_half,
            write_buffer: BytesMut::with_capacity(4096),
            replies,
            notifications,
            request_timeout: REQUEST_TIMEOUT,
        })
    }

    pub fn set_request_timeout(&mut self, timeout: Duration) {
        self.request_timeout = timeout;
    }

    /// Send one request and wait for its reply.
    pub async fn request(&mut self, msg: &ClientMessage) -> Result<Reply> {
        self.send(msg).await?;
        match timeout(self.request_timeout, self.replies.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(anyhow!("connection closed before reply")),
            Err(_) => Err(anyhow!("timed out waiting for reply")),
        }
    }

    /// Authenticate; must be the first request on the connection.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<bool> {
        let reply = self
            .request(&ClientMessage::Auth {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;
        Ok(reply.status == Status::AuthSuccess)
    }

    /// Receive the next pushed trade notification.
    pub async fn next_notification(&mut self) -> Option<TradeNotification> {
        self.notifications.recv().await
    }

    /// Like [`next_notification`](Self::next_notification) but bounded.
    pub async fn notification_within(&mut self, wait: Duration) -> Option<TradeNotification> {
        timeout(wait, self.notifications.recv()).await.ok().flatten()
    }

    async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let payload = serde_json::to_vec(msg)?;
        self.write_buffer.clear();
        self.write_buffer.put_u32(payload.len() as u32);
        self.write_buffer.extend_from_slice(&payload);
        self.write_half.write_all(&self.write_buffer).await?;
        self.write_half.flush().await?;
        debug!(?msg, "sent request");
        Ok(())
    }
}
