//! Connection capability for the status change notifier.
//!
//! The observer only needs to read and write discrete frames. It depends on
//! the [`Conn`] trait rather than a concrete socket so tests can substitute
//! an in-memory connection, and on [`Dialer`] to establish one.

use std::fmt;

use uuid::Uuid;

use crate::error::TransportError;

/// WebSocket implementation over `tungstenite`.
pub mod ws;

pub use ws::{WsConn, WsDialer};

/// Frame type tag. Values follow the WebSocket opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// UTF-8 text frame.
    Text = 1,
    /// Binary frame. The subscribe handshake is always sent as binary.
    Binary = 2,
    /// Close frame.
    Close = 8,
    /// Ping control frame.
    Ping = 9,
    /// Pong control frame.
    Pong = 10,
}

impl MessageType {
    /// Whether frames of this type carry application data.
    #[must_use]
    pub const fn is_data(self) -> bool {
        matches!(self, Self::Text | Self::Binary)
    }
}

/// A duplex message channel.
#[cfg_attr(test, mockall::automock)]
pub trait Conn: Send {
    /// Read the next frame (blocking).
    fn read_message(&mut self) -> Result<(MessageType, Vec<u8>), TransportError>;

    /// Write a single frame (blocking).
    fn write_message(&mut self, kind: MessageType, data: &[u8]) -> Result<(), TransportError>;
}

/// Establishes connections to an endpoint URL.
pub trait Dialer: Send + Sync {
    /// Dial `url` and return the live connection.
    fn dial(&self, url: &str) -> Result<Box<dyn Conn>, TransportError>;
}

/// Identifier of one established connection, for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a new random connection id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
