//! WebSocket Broadcast Chat Hub Library
//!
//! A chat hub where every message a participant sends is fanned out to
//! every other connected participant, with optional SQLite-backed history
//! replayed to late joiners.
//!
//! # Features
//! - WebSocket connection handling
//! - Join with a display name, announced to everyone
//! - Chat broadcast to everyone except the sender
//! - History persistence and replay on join
//! - Slow consumer eviction
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Hub` is the single actor owning the membership set
//! - Each connection runs a read task and a write task (`session`)
//! - Each connection has a bounded outbound queue; the Hub never blocks on
//!   it and evicts the connection when it is full
//! - No locks needed for membership - all access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use chat_hub::{http, Config, Hub, SessionContext};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!     let session = SessionContext::new(Hub::spawn());
//!     let state = Arc::new(http::AppState::new(session, &config));
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     http::serve(listener, http::router(state, &config)).await.unwrap();
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod history;
pub mod http;
pub mod hub;
pub mod message;
pub mod session;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use config::Config;
pub use connection::{Connection, ConnectionHandle};
pub use error::{AppError, DeliveryError, SendError, StoreError, TransportError};
pub use history::{HistoryRecord, HistoryStore, MemoryHistory, SqliteHistory};
pub use hub::{Hub, HubCommand, HubHandle};
pub use message::{BroadcastMessage, ClientMessage};
pub use session::{handle_connection, SessionContext};
pub use types::{ConnectionId, Payload};
