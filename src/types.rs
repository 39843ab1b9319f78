//! Basic type definitions for the chat hub
//!
//! Provides:
//! - `ConnectionId`: UUID-based opaque connection handle
//! - `Payload`: shared immutable outbound text

use std::sync::Arc;

use uuid::Uuid;

/// Membership key for one participant
///
/// The Hub keys its member table by this id. Sessions hand it back to
/// unregister, and chat broadcasts carry it as the origin to skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Fresh id for a connection being opened
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One outbound line, shared by every queue it is fanned out to.
pub type Payload = Arc<str>;
