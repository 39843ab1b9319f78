//! Per-connection session protocol
//!
//! Each connection runs a read loop (transport → Hub) and a write loop
//! (outbound queue → transport). Whichever ends first ends the session:
//! - read loop ends (peer closed or transport error): unregister and stop
//!   the write loop
//! - write loop ends (write error): the read loop is dropped with the
//!   transport reader, which closes the socket
//! - Hub drops the connection (eviction): the read loop is dropped and
//!   the write loop is aborted, even if it is stuck on a stalled send

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::connection::Connection;
use crate::history::HistoryStore;
use crate::hub::HubHandle;
use crate::message::{chat_line, join_line, BroadcastMessage, ClientMessage};
use crate::transport::{FrameReader, FrameWriter};
use crate::types::{ConnectionId, Payload};

/// Default number of history lines replayed on join
pub const DEFAULT_REPLAY_LIMIT: usize = 50;

/// Default outbound queue capacity per connection
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

/// Everything a session needs from the rest of the process
#[derive(Clone)]
pub struct SessionContext {
    pub hub: HubHandle,
    /// `None` disables both persistence and replay
    pub history: Option<Arc<dyn HistoryStore>>,
    pub replay_limit: usize,
    pub outbound_capacity: usize,
}

impl SessionContext {
    pub fn new(hub: HubHandle) -> Self {
        Self {
            hub,
            history: None,
            replay_limit: DEFAULT_REPLAY_LIMIT,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }
}

/// Run one connection from registration to teardown
pub async fn handle_connection<R, W>(reader: R, writer: W, ctx: SessionContext)
where
    R: FrameReader,
    W: FrameWriter + 'static,
{
    let (mut connection, handle, outbound) = Connection::open(ctx.outbound_capacity);
    let id = connection.id;
    let evicted = connection.eviction();

    ctx.hub.register(handle);
    info!("Connection {} opened", id);

    let mut write_task = tokio::spawn(write_loop(id, writer, outbound));

    tokio::select! {
        biased;

        _ = evicted.cancelled() => {
            debug!("Connection {} dropped by the Hub", id);
        }
        _ = &mut write_task => {
            debug!("Write loop completed for {}", id);
        }
        _ = read_loop(&mut connection, reader, &ctx) => {
            debug!("Read loop completed for {}", id);
        }
    }

    // A no-op if the Hub already evicted us
    ctx.hub.unregister(id);
    // The peer is gone or too slow; a pending send may never complete
    write_task.abort();

    info!("Connection {} closed", id);
}

/// Transport → Hub
async fn read_loop<R: FrameReader>(connection: &mut Connection, mut reader: R, ctx: &SessionContext) {
    loop {
        let text = match reader.receive().await {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("Connection {} closed by peer", connection.id);
                return;
            }
            Err(e) => {
                warn!("Transport error for {}: {}", connection.id, e);
                return;
            }
        };

        match ClientMessage::decode(&text) {
            Ok(msg) => handle_message(connection, msg, ctx).await,
            Err(e) => warn!("Invalid frame from {}: {}", connection.id, e),
        }
    }
}

async fn handle_message(connection: &mut Connection, msg: ClientMessage, ctx: &SessionContext) {
    match msg {
        ClientMessage::Join { username } => handle_join(connection, username, ctx).await,
        ClientMessage::Chat { message } => handle_chat(connection, message, ctx).await,
        ClientMessage::Unknown => {
            debug!("Ignoring unknown message type from {}", connection.id);
        }
    }
}

async fn handle_join(connection: &mut Connection, username: String, ctx: &SessionContext) {
    if username.is_empty() {
        warn!("Ignoring join with empty username from {}", connection.id);
        return;
    }

    let first_join = !connection.has_name();
    connection.set_name(username);
    info!("Connection {} joined as '{}'", connection.id, connection.display_name());

    // Renames announce again but do not replay
    if first_join {
        replay_history(connection, ctx).await;
    }

    if !connection.is_alive() {
        return;
    }
    ctx.hub
        .broadcast(BroadcastMessage::system(join_line(connection.display_name())));
}

/// Send recent history privately to this connection, oldest first
async fn replay_history(connection: &Connection, ctx: &SessionContext) {
    let Some(history) = &ctx.history else {
        return;
    };
    if ctx.replay_limit == 0 {
        return;
    }

    let mut records = match history.recent_history(ctx.replay_limit).await {
        Ok(records) => records,
        Err(e) => {
            error!("Failed to load history for {}: {}", connection.id, e);
            return;
        }
    };
    records.reverse();

    debug!("Replaying {} lines to {}", records.len(), connection.id);
    for record in records {
        let line = chat_line(&record.username, &record.message);
        if connection.reply(line).await.is_err() {
            debug!("Queue closed during replay for {}", connection.id);
            return;
        }
    }
}

async fn handle_chat(connection: &Connection, message: String, ctx: &SessionContext) {
    let name = connection.display_name();

    // Persistence is best-effort; delivery goes ahead regardless
    if let Some(history) = &ctx.history {
        if let Err(e) = history.append(name, &message).await {
            error!("Failed to persist message from {}: {}", connection.id, e);
        }
    }

    if !connection.is_alive() {
        debug!("Dropping chat from evicted connection {}", connection.id);
        return;
    }
    ctx.hub
        .broadcast(BroadcastMessage::chat(connection.id, chat_line(name, &message)));
}

/// Outbound queue → transport
async fn write_loop<W: FrameWriter>(id: ConnectionId, mut writer: W, mut outbound: mpsc::Receiver<Payload>) {
    while let Some(payload) = outbound.recv().await {
        if let Err(e) = writer.send(&payload).await {
            debug!("Write failed for {}: {}", id, e);
            break;
        }
    }
    debug!("Write loop ended for {}", id);

    let _ = writer.close().await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    use super::*;
    use crate::error::{StoreError, TransportError};
    use crate::history::{HistoryRecord, MemoryHistory};
    use crate::hub::Hub;
    use crate::transport::memory::{self, Peer};

    const WAIT: Duration = Duration::from_secs(2);

    fn connect(ctx: &SessionContext) -> (Peer, JoinHandle<()>) {
        let (reader, writer, peer) = memory::pair();
        let task = tokio::spawn(handle_connection(reader, writer, ctx.clone()));
        (peer, task)
    }

    async fn next_line(peer: &mut Peer) -> String {
        timeout(WAIT, peer.recv())
            .await
            .expect("timed out waiting for a line")
            .expect("session closed")
    }

    async fn wait_for_members(hub: &HubHandle, count: usize) -> Vec<ConnectionId> {
        timeout(WAIT, async {
            loop {
                let members = hub.members().await;
                if members.len() == count {
                    return members;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("timed out waiting for membership")
    }

    fn join(name: &str) -> String {
        format!(r#"{{"type": "join", "username": "{}"}}"#, name)
    }

    fn chat(text: &str) -> String {
        format!(r#"{{"type": "chat", "message": "{}"}}"#, text)
    }

    struct FailingHistory;

    #[async_trait]
    impl HistoryStore for FailingHistory {
        async fn append(&self, _username: &str, _message: &str) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }

        async fn recent_history(&self, _limit: usize) -> Result<Vec<HistoryRecord>, StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    /// A transport whose peer never reads
    struct StalledWriter;

    #[async_trait]
    impl FrameWriter for StalledWriter {
        async fn send(&mut self, _frame: &str) -> Result<(), TransportError> {
            std::future::pending::<Result<(), TransportError>>().await
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_chat_fan_out_and_slow_consumer_eviction() {
        let hub = Hub::spawn();
        let ctx = SessionContext::new(hub.clone()).with_history(Arc::new(MemoryHistory::new()));

        let (mut a, _task_a) = connect(&ctx);
        let (mut b, _task_b) = connect(&ctx);
        // C is a participant whose queue is never drained
        let (c, c_handle, mut c_rx) = Connection::open(3);
        hub.register(c_handle);
        wait_for_members(&hub, 3).await;

        a.send(join("alice")).unwrap();
        assert_eq!(next_line(&mut a).await, "alice joined the chat");
        assert_eq!(next_line(&mut b).await, "alice joined the chat");

        b.send(join("bob")).unwrap();
        assert_eq!(next_line(&mut a).await, "bob joined the chat");
        assert_eq!(next_line(&mut b).await, "bob joined the chat");

        a.send(chat("hi")).unwrap();
        assert_eq!(next_line(&mut b).await, "alice: hi");

        // C is now full; this broadcast evicts it and still reaches A
        b.send(chat("yo")).unwrap();
        assert_eq!(next_line(&mut a).await, "bob: yo");

        assert!(!hub.members().await.contains(&c.id));
        assert_eq!(c_rx.recv().await.as_deref(), Some("alice joined the chat"));
        assert_eq!(c_rx.recv().await.as_deref(), Some("bob joined the chat"));
        assert_eq!(c_rx.recv().await.as_deref(), Some("alice: hi"));
        assert!(c_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_history_replays_in_chronological_order() {
        let hub = Hub::spawn();
        let history = Arc::new(MemoryHistory::new());
        for i in 1..=55 {
            history.append("old", &format!("R{}", i)).await.unwrap();
        }
        let ctx = SessionContext::new(hub).with_history(history);

        let (mut a, _task) = connect(&ctx);
        a.send(join("alice")).unwrap();

        for i in 6..=55 {
            assert_eq!(next_line(&mut a).await, format!("old: R{}", i));
        }
        assert_eq!(next_line(&mut a).await, "alice joined the chat");
    }

    #[tokio::test]
    async fn test_rename_does_not_replay_again() {
        let hub = Hub::spawn();
        let history = Arc::new(MemoryHistory::new());
        history.append("old", "before").await.unwrap();
        let ctx = SessionContext::new(hub).with_history(history);

        let (mut a, _task) = connect(&ctx);
        a.send(join("alice")).unwrap();
        assert_eq!(next_line(&mut a).await, "old: before");
        assert_eq!(next_line(&mut a).await, "alice joined the chat");

        a.send(join("alicia")).unwrap();
        assert_eq!(next_line(&mut a).await, "alicia joined the chat");
    }

    #[tokio::test]
    async fn test_chat_is_persisted() {
        let hub = Hub::spawn();
        let history = Arc::new(MemoryHistory::new());
        let ctx = SessionContext::new(hub.clone()).with_history(history.clone());

        let (mut a, _task_a) = connect(&ctx);
        let (mut b, _task_b) = connect(&ctx);
        wait_for_members(&hub, 2).await;

        a.send(join("alice")).unwrap();
        assert_eq!(next_line(&mut b).await, "alice joined the chat");
        a.send(chat("hello")).unwrap();
        assert_eq!(next_line(&mut b).await, "alice: hello");

        assert_eq!(
            history.recent_history(10).await.unwrap(),
            vec![HistoryRecord::new("alice", "hello")]
        );
    }

    #[tokio::test]
    async fn test_history_failure_does_not_block_delivery() {
        let hub = Hub::spawn();
        let ctx = SessionContext::new(hub.clone()).with_history(Arc::new(FailingHistory));

        let (mut a, _task_a) = connect(&ctx);
        let (mut b, _task_b) = connect(&ctx);
        wait_for_members(&hub, 2).await;

        a.send(join("alice")).unwrap();
        assert_eq!(next_line(&mut a).await, "alice joined the chat");
        assert_eq!(next_line(&mut b).await, "alice joined the chat");

        a.send(chat("still here")).unwrap();
        assert_eq!(next_line(&mut b).await, "alice: still here");
    }

    #[tokio::test]
    async fn test_chat_before_join_is_anonymous() {
        let hub = Hub::spawn();
        let ctx = SessionContext::new(hub.clone());

        let (a, _task_a) = connect(&ctx);
        let (mut b, _task_b) = connect(&ctx);
        wait_for_members(&hub, 2).await;

        a.send(chat("who am i")).unwrap();

        assert_eq!(next_line(&mut b).await, "anonymous: who am i");
    }

    #[tokio::test]
    async fn test_bad_frames_are_skipped() {
        let hub = Hub::spawn();
        let ctx = SessionContext::new(hub);

        let (mut a, _task) = connect(&ctx);
        a.send("not json").unwrap();
        a.send(r#"{"type": "typing"}"#).unwrap();
        a.send(join("")).unwrap();
        a.send(join("alice")).unwrap();

        assert_eq!(next_line(&mut a).await, "alice joined the chat");
    }

    #[tokio::test]
    async fn test_disconnect_unregisters_and_closes_queue() {
        let hub = Hub::spawn();
        let ctx = SessionContext::new(hub.clone());

        let (mut a, task) = connect(&ctx);
        wait_for_members(&hub, 1).await;

        a.disconnect();

        // Write loop stops, closing the transport
        assert!(timeout(WAIT, a.recv()).await.unwrap().is_none());
        timeout(WAIT, task).await.unwrap().unwrap();
        assert!(hub.members().await.is_empty());
    }

    #[tokio::test]
    async fn test_hub_removal_ends_blocked_session() {
        let hub = Hub::spawn();
        let ctx = SessionContext::new(hub.clone());

        let (mut a, task) = connect(&ctx);
        let members = wait_for_members(&hub, 1).await;

        // The peer never hangs up; only the Hub drops the connection
        hub.unregister(members[0]);

        timeout(WAIT, task).await.unwrap().unwrap();
        assert!(timeout(WAIT, a.recv()).await.unwrap().is_none());
        assert!(a.send(join("late")).is_err());
    }

    #[tokio::test]
    async fn test_eviction_ends_session_with_stalled_writer() {
        let hub = Hub::spawn();
        let mut ctx = SessionContext::new(hub.clone());
        ctx.outbound_capacity = 2;

        let (reader, _unused_writer, a) = memory::pair();
        let task = tokio::spawn(handle_connection(reader, StalledWriter, ctx));
        let (b, b_handle, mut b_rx) = Connection::open(8);
        hub.register(b_handle);
        wait_for_members(&hub, 2).await;

        // One item is stuck in send, two fill the queue, the rest overflow
        for i in 0..5 {
            hub.broadcast(BroadcastMessage::system(Arc::from(format!("notice {}", i))));
        }

        timeout(WAIT, task).await.unwrap().unwrap();
        assert_eq!(hub.members().await, vec![b.id]);

        // Nothing sent after eviction reaches the others
        let _ = a.send(chat("i was evicted"));
        hub.members().await;
        for i in 0..5 {
            let expected = format!("notice {}", i);
            assert_eq!(b_rx.recv().await.as_deref(), Some(expected.as_str()));
        }
        assert!(b_rx.try_recv().is_err());
    }
}
