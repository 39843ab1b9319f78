//! Error types for the chat hub
//!
//! Defines process-level errors, transport and store errors, and the
//! outbound queue errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Fatal at startup: config loading, history store, binding.
/// Hub operations never return errors.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Config file parsed but holds an unusable value
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// History store failure
    #[error("History store error: {0}")]
    Store(#[from] StoreError),
}

/// Duplex transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] axum::Error),

    /// The other side is gone
    #[error("Transport closed")]
    Closed,
}

/// History store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Blocking store task panicked or was cancelled
    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A previous holder of the store lock panicked
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Message send errors
///
/// Occurs when a session writes to its own outbound queue after
/// the Hub has closed it.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}

/// Non-blocking delivery errors seen by the Hub during fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Outbound queue is at capacity (consumer too slow)
    #[error("Outbound queue full")]
    Full,

    /// Write loop is gone
    #[error("Outbound queue closed")]
    Closed,
}
