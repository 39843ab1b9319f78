//! Hub actor implementation
//!
//! The single owner of the membership set. Register, unregister and
//! broadcast requests arrive on one ordered intake and are processed
//! strictly one at a time, so no broadcast ever sees a set that is being
//! mutated and no evicted connection receives a later broadcast.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::connection::ConnectionHandle;
use crate::error::DeliveryError;
use crate::message::BroadcastMessage;
use crate::types::ConnectionId;

/// Commands sent to the Hub actor
#[derive(Debug)]
pub enum HubCommand {
    /// Admit a connection
    Register(ConnectionHandle),
    /// Remove a connection and close its queue
    Unregister(ConnectionId),
    /// Fan out to every member except the origin
    Broadcast(BroadcastMessage),
    /// Snapshot the membership set
    Members {
        reply: oneshot::Sender<Vec<ConnectionId>>,
    },
}

/// Cloneable handle for submitting commands to the Hub
///
/// Every operation is enqueue-and-return. If the Hub has stopped, the
/// command is dropped.
#[derive(Debug, Clone)]
pub struct HubHandle {
    sender: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    pub fn register(&self, connection: ConnectionHandle) {
        self.submit(HubCommand::Register(connection));
    }

    /// Safe to call for a connection that is already gone
    pub fn unregister(&self, id: ConnectionId) {
        self.submit(HubCommand::Unregister(id));
    }

    pub fn broadcast(&self, message: BroadcastMessage) {
        self.submit(HubCommand::Broadcast(message));
    }

    /// Current members, ordered after every command submitted before it
    ///
    /// Returns an empty list if the Hub has stopped.
    pub async fn members(&self) -> Vec<ConnectionId> {
        let (reply, rx) = oneshot::channel();
        self.submit(HubCommand::Members { reply });
        rx.await.unwrap_or_default()
    }

    fn submit(&self, cmd: HubCommand) {
        if self.sender.send(cmd).is_err() {
            debug!("Hub stopped, dropping command");
        }
    }
}

/// The Hub actor
pub struct Hub {
    /// All registered connections: ConnectionId -> queue handle
    members: HashMap<ConnectionId, ConnectionHandle>,
    /// Command receiver channel
    receiver: mpsc::UnboundedReceiver<HubCommand>,
}

impl Hub {
    /// Create a Hub and the handle that feeds it
    pub fn new() -> (Self, HubHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let hub = Self {
            members: HashMap::new(),
            receiver,
        };
        (hub, HubHandle { sender })
    }

    /// Create a Hub and run it on its own task
    pub fn spawn() -> HubHandle {
        let (hub, handle) = Self::new();
        tokio::spawn(hub.run());
        handle
    }

    /// Run the Hub event loop
    ///
    /// Processes commands until every `HubHandle` is dropped. Remaining
    /// queues are closed when the membership set is dropped.
    pub async fn run(mut self) {
        info!("Hub started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("Hub shutting down, closing {} connections", self.members.len());
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register(connection) => self.handle_register(connection),
            HubCommand::Unregister(id) => self.handle_unregister(id),
            HubCommand::Broadcast(message) => self.handle_broadcast(message),
            HubCommand::Members { reply } => {
                let _ = reply.send(self.members.keys().copied().collect());
            }
        }
    }

    fn handle_register(&mut self, connection: ConnectionHandle) {
        info!("Connection {} registered", connection.id);
        // Re-registering an id replaces (and closes) the earlier queue
        self.members.insert(connection.id, connection);
        debug!("Total connections: {}", self.members.len());
    }

    fn handle_unregister(&mut self, id: ConnectionId) {
        // Dropping the handle closes the queue and ends the write loop
        if self.members.remove(&id).is_some() {
            info!("Connection {} unregistered", id);
            debug!("Total connections: {}", self.members.len());
        }
    }

    fn handle_broadcast(&mut self, message: BroadcastMessage) {
        let mut dead = Vec::new();

        for (id, connection) in &self.members {
            if message.origin == Some(*id) {
                continue;
            }
            match connection.try_deliver(message.payload.clone()) {
                Ok(()) => {}
                Err(DeliveryError::Full) => {
                    warn!("Connection {} too slow, evicting", id);
                    dead.push(*id);
                }
                Err(DeliveryError::Closed) => {
                    debug!("Connection {} queue closed, evicting", id);
                    dead.push(*id);
                }
            }
        }

        for id in dead {
            self.members.remove(&id);
        }
    }
}
