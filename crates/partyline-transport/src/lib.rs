//! Transport abstraction layer for Partyline.
//!
//! Provides the [`Transport`] and [`Connection`] traits the server is
//! written against, and a WebSocket implementation of both.
//!
//! Unlike a bare byte pipe, a Partyline connection also carries what the
//! client asked for when it connected: the request path (which names the
//! room and endpoint) and the offered sub-protocols (which carry the
//! endpoint secret). Both are captured during the upgrade and exposed as a
//! [`HandshakeRequest`].
//!
//! Accepting is split in two. [`Transport::accept`] only takes the raw
//! stream off the listener; the upgrade runs later through
//! [`Incoming::upgrade`], on the connection's own task, so a peer that
//! never finishes its handshake only ever holds up itself.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    DEFAULT_HANDSHAKE_TIMEOUT, IncomingWebSocket, WebSocketConnection, WebSocketTransport,
};

use std::fmt;

use partyline_protocol::CloseCode;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What the client sent when it opened the connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Request path, e.g. `/talk/QZVK/abc123def456`.
    pub path: String,
    /// Offered sub-protocols, in the order the client listed them.
    pub protocols: Vec<String>,
}

impl HandshakeRequest {
    /// Splits raw `Sec-WebSocket-Protocol` header values into individual
    /// protocols. Each header may hold a comma-separated list.
    pub fn parse_protocols<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        values
            .into_iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

/// An inbound message from the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary(Vec<u8>),
}

impl Inbound {
    /// Size of the message in bytes.
    pub fn len(&self) -> usize {
        match self {
            Inbound::Text(t) => t.len(),
            Inbound::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// An accepted stream that has not been upgraded yet.
    type Incoming: Incoming<Connection = Self::Connection, Error = Self::Error>;
    /// The connection type produced by this transport.
    type Connection: Connection;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next incoming stream.
    ///
    /// Returns as soon as the stream is accepted; no bytes are read from it.
    async fn accept(&mut self) -> Result<Self::Incoming, Self::Error>;

    /// Gracefully shuts down the transport, stopping new connections.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// An accepted stream waiting for its protocol upgrade.
pub trait Incoming: Send + 'static {
    /// The connection this stream becomes once upgraded.
    type Connection: Connection;
    /// The error type for a failed upgrade.
    type Error: std::error::Error + Send + Sync;

    /// Identifier the upgraded connection will carry.
    fn id(&self) -> ConnectionId;

    /// Runs the upgrade handshake, giving up once the transport's
    /// handshake timeout elapses.
    async fn upgrade(self) -> Result<Self::Connection, Self::Error>;
}

/// A single connection that can send and receive messages.
///
/// Sending and receiving may happen concurrently from different tasks.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends a text message to the remote peer.
    async fn send_text(&self, text: &str) -> Result<(), Self::Error>;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Inbound>, Self::Error>;

    /// Closes the connection with the given close code.
    async fn close(&self, code: CloseCode) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Returns the request the client opened this connection with.
    fn handshake(&self) -> &HandshakeRequest;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_parse_protocols_splits_comma_lists() {
        let protocols =
            HandshakeRequest::parse_protocols(["Secretabc, chat", "json"]);
        assert_eq!(protocols, vec!["Secretabc", "chat", "json"]);
    }

    #[test]
    fn test_parse_protocols_drops_empty_entries() {
        let protocols = HandshakeRequest::parse_protocols([" , Secretabc,"]);
        assert_eq!(protocols, vec!["Secretabc"]);
    }

    #[test]
    fn test_parse_protocols_none_offered() {
        let protocols = HandshakeRequest::parse_protocols(std::iter::empty());
        assert!(protocols.is_empty());
    }

    #[test]
    fn test_inbound_len() {
        assert_eq!(Inbound::Text("héllo".into()).len(), 6);
        assert_eq!(Inbound::Binary(vec![1, 2, 3]).len(), 3);
        assert!(Inbound::Text(String::new()).is_empty());
    }
}
