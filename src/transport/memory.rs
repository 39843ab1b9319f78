//! In-process transport backed by unbounded channels
//!
//! `pair()` returns the session-side halves plus a `Peer` that plays the
//! remote participant.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{FrameReader, FrameWriter};
use crate::error::TransportError;

pub struct MemoryReader {
    inbound: mpsc::UnboundedReceiver<String>,
}

pub struct MemoryWriter {
    outbound: Option<mpsc::UnboundedSender<String>>,
}

/// The remote end of an in-memory transport
pub struct Peer {
    inbound: Option<mpsc::UnboundedSender<String>>,
    outbound: mpsc::UnboundedReceiver<String>,
}

/// Create a connected reader/writer pair and its peer
pub fn pair() -> (MemoryReader, MemoryWriter, Peer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    (
        MemoryReader { inbound: in_rx },
        MemoryWriter {
            outbound: Some(out_tx),
        },
        Peer {
            inbound: Some(in_tx),
            outbound: out_rx,
        },
    )
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn receive(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self.inbound.recv().await)
    }
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        outbound
            .send(frame.to_string())
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.outbound = None;
        Ok(())
    }
}

impl Peer {
    /// Deliver a raw frame to the session
    pub fn send(&self, frame: impl Into<String>) -> Result<(), TransportError> {
        let inbound = self.inbound.as_ref().ok_or(TransportError::Closed)?;
        inbound.send(frame.into()).map_err(|_| TransportError::Closed)
    }

    /// Next line written by the session; `None` once its writer is gone
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Hang up the inbound direction, as a dropped socket would
    pub fn disconnect(&mut self) {
        self.inbound = None;
    }
}
