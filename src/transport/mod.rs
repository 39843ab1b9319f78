//! Duplex transport abstraction
//!
//! Sessions only need to receive frames, send frames, and close. The read
//! and write halves are separate traits so each can live on its own task.

use async_trait::async_trait;

use crate::error::TransportError;

pub mod memory;
pub mod websocket;

pub use websocket::{split as split_websocket, WebSocketReader, WebSocketWriter};

/// Inbound half of a transport
#[async_trait]
pub trait FrameReader: Send {
    /// Wait for the next text frame
    ///
    /// Returns `Ok(None)` once the other side has closed.
    async fn receive(&mut self) -> Result<Option<String>, TransportError>;
}

/// Outbound half of a transport
#[async_trait]
pub trait FrameWriter: Send {
    /// Send one text frame
    async fn send(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Close the transport, best effort
    async fn close(&mut self) -> Result<(), TransportError>;
}
