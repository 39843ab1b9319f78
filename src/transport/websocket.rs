//! WebSocket transport over axum's upgraded socket

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::debug;

use super::{FrameReader, FrameWriter};
use crate::error::TransportError;

/// Receiving half of a WebSocket
pub struct WebSocketReader(SplitStream<WebSocket>);

/// Sending half of a WebSocket
pub struct WebSocketWriter(SplitSink<WebSocket, Message>);

/// Split an upgraded socket into transport halves
pub fn split(socket: WebSocket) -> (WebSocketReader, WebSocketWriter) {
    let (sink, stream) = socket.split();
    (WebSocketReader(stream), WebSocketWriter(sink))
}

#[async_trait]
impl FrameReader for WebSocketReader {
    async fn receive(&mut self) -> Result<Option<String>, TransportError> {
        while let Some(msg) = self.0.next().await {
            match msg? {
                Message::Text(text) => return Ok(Some(text)),
                Message::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => return Ok(Some(text)),
                    Err(_) => debug!("Dropping non-UTF-8 binary frame"),
                },
                Message::Close(_) => return Ok(None),
                // Pong is handled automatically by axum
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl FrameWriter for WebSocketWriter {
    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        self.0.send(Message::Text(frame.to_string())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0.close().await?;
        Ok(())
    }
}
