//! Connection state
//!
//! A connection is split three ways when opened:
//! - `Connection`: session-owned state (id, display name)
//! - `ConnectionHandle`: Hub-owned, the only strong sender to the queue
//! - `mpsc::Receiver<Payload>`: drained by the session's write loop
//!
//! Dropping the `ConnectionHandle` closes the outbound queue and cancels
//! the connection's eviction token.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{DeliveryError, SendError};
use crate::types::{ConnectionId, Payload};

/// Name used for chat sent before any join
pub const ANONYMOUS: &str = "anonymous";

/// Session-side view of one participant
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Display name (None before the first join)
    name: Option<String>,
    /// Weak so that the Hub alone decides when the queue closes
    outbound: mpsc::WeakSender<Payload>,
    /// Cancelled once the Hub no longer holds this connection
    evicted: CancellationToken,
}

/// Hub-side reference to a connection's outbound queue
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    sender: mpsc::Sender<Payload>,
    _evict_on_drop: DropGuard,
}

impl Connection {
    /// Open a connection with a bounded outbound queue
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Config validation rejects that.
    pub fn open(capacity: usize) -> (Connection, ConnectionHandle, mpsc::Receiver<Payload>) {
        let id = ConnectionId::new();
        let (sender, receiver) = mpsc::channel(capacity);
        let evicted = CancellationToken::new();
        let connection = Connection {
            id,
            name: None,
            outbound: sender.downgrade(),
            evicted: evicted.clone(),
        };
        let handle = ConnectionHandle {
            id,
            sender,
            _evict_on_drop: evicted.drop_guard(),
        };
        (connection, handle, receiver)
    }

    /// Get the display name for this connection
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(ANONYMOUS)
    }

    /// Check if a join has named this connection
    pub fn has_name(&self) -> bool {
        self.name.is_some()
    }

    /// Record the display name from a join
    pub fn set_name(&mut self, name: String) {
        self.name = Some(name);
    }

    /// Whether the Hub still holds this connection's queue
    pub fn is_alive(&self) -> bool {
        !self.evicted.is_cancelled()
    }

    /// Token cancelled when the Hub drops this connection
    ///
    /// Fires even while the write loop is stuck on a stalled transport.
    pub fn eviction(&self) -> CancellationToken {
        self.evicted.clone()
    }

    /// Enqueue a private reply onto this connection's own queue
    ///
    /// Waits for room rather than failing on a full queue; this only
    /// throttles the calling session. Fails once the Hub closed the queue.
    pub async fn reply(&self, payload: Payload) -> Result<(), SendError> {
        let sender = self.outbound.upgrade().ok_or(SendError::ChannelClosed)?;
        sender
            .send(payload)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }
}

impl ConnectionHandle {
    /// Non-blocking enqueue used by the Hub's fan-out
    pub fn try_deliver(&self, payload: Payload) -> Result<(), DeliveryError> {
        self.sender.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}
