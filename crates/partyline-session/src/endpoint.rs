//! Endpoints: the server's record of one participant in a room.
//!
//! An endpoint tracks:
//! - WHO the participant is (`id`, `display_name`, `role`)
//! - HOW they prove it (a [`Secret`])
//! - WHERE to deliver frames right now (a [`ConnectionState`])
//!
//! The endpoint lives as long as the room. Sockets come and go underneath
//! it: a phone that locks its screen drops its connection and binds a new
//! one a minute later with the same id and secret.

use partyline_protocol::{CloseCode, GameRole};
use partyline_transport::ConnectionId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::Secret;

// ---------------------------------------------------------------------------
// Outbound channel
// ---------------------------------------------------------------------------

/// Something the room wants written to an endpoint's socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A routed frame, written verbatim.
    Frame(String),
    /// Close the socket with the given code.
    Close(CloseCode),
}

/// Capacity of each socket's outbound queue.
pub const OUTBOUND_QUEUE_LEN: usize = 256;

/// Channel sender for delivering outbound items to a connection task.
///
/// Bounded, and only ever used with `try_send`: a room never waits on a
/// slow socket, and a socket whose peer stops reading loses frames once
/// its queue is full instead of growing without limit.
pub type EndpointSender = mpsc::Sender<Outbound>;

/// A live socket bound to an endpoint.
#[derive(Debug, Clone)]
pub struct EndpointSocket {
    /// The transport connection that owns the receiving half.
    pub connection: ConnectionId,
    pub sender: EndpointSender,
}

impl EndpointSocket {
    pub fn new(connection: ConnectionId, sender: EndpointSender) -> Self {
        Self { connection, sender }
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Whether an endpoint currently has a socket.
///
/// ```text
///   Unbound ──(bind)──→ Bound ──(unbind / socket closed)──→ Unbound
///                         ↑  │
///                         └──┘ (rebind: replaces the old socket)
/// ```
///
/// Sending to an `Unbound` endpoint is a defined no-op, not a failure;
/// devices are routinely between sockets.
#[derive(Debug, Clone, Default)]
pub enum ConnectionState {
    #[default]
    Unbound,
    Bound(EndpointSocket),
}

/// Outcome of trying to hand a frame to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on the endpoint's socket.
    Sent,
    /// The endpoint has no socket right now.
    Unbound,
    /// The endpoint had a socket, but its connection task is gone.
    Closed,
    /// The socket's outbound queue is full; the frame was dropped.
    Full,
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// One participant in a room.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub id: String,
    pub display_name: String,
    pub role: GameRole,
    secret: Secret,
    connection: ConnectionState,
}

impl Endpoint {
    /// Creates an endpoint with no socket.
    pub fn new(
        id: impl Into<String>,
        secret: Secret,
        display_name: impl Into<String>,
        role: GameRole,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            role,
            secret,
            connection: ConnectionState::Unbound,
        }
    }

    /// Constant-time check of an alleged secret.
    pub fn secret_matches(&self, alleged: &str) -> bool {
        self.secret.matches(alleged)
    }

    pub fn is_presenter(&self) -> bool {
        self.role == GameRole::Presenter
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.connection, ConnectionState::Bound(_))
    }

    /// Binds a socket, returning the one it replaced (if any).
    pub fn bind(&mut self, socket: EndpointSocket) -> Option<EndpointSocket> {
        match std::mem::replace(&mut self.connection, ConnectionState::Bound(socket)) {
            ConnectionState::Bound(previous) => Some(previous),
            ConnectionState::Unbound => None,
        }
    }

    /// Unbinds the socket, but only if it still belongs to `connection`.
    ///
    /// A device that reconnects quickly can have its old connection's close
    /// arrive after the new bind; that late close must not detach the new
    /// socket. Returns `true` if something was unbound.
    pub fn unbind(&mut self, connection: ConnectionId) -> bool {
        match &self.connection {
            ConnectionState::Bound(socket) if socket.connection == connection => {
                self.connection = ConnectionState::Unbound;
                true
            }
            _ => {
                tracing::debug!(id = %self.id, %connection, "stale unbind ignored");
                false
            }
        }
    }

    /// Queues a frame on the endpoint's socket, if it has one.
    pub fn deliver(&self, frame: String) -> Delivery {
        match &self.connection {
            ConnectionState::Unbound => Delivery::Unbound,
            ConnectionState::Bound(socket) => {
                match socket.sender.try_send(Outbound::Frame(frame)) {
                    Ok(()) => Delivery::Sent,
                    Err(TrySendError::Full(_)) => Delivery::Full,
                    Err(TrySendError::Closed(_)) => Delivery::Closed,
                }
            }
        }
    }

    /// Asks the socket to close with `code` and unbinds it.
    ///
    /// Returns `true` if there was a socket to close.
    pub fn close(&mut self, code: CloseCode) -> bool {
        match std::mem::take(&mut self.connection) {
            ConnectionState::Bound(socket) => {
                // Dropping the sender ends the writer even when the close
                // can't be queued; it then closes with 1000.
                match socket.sender.try_send(Outbound::Close(code)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::debug!(id = %self.id, connection = %socket.connection, "outbound queue full, close code lost");
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(id = %self.id, connection = %socket.connection, "socket already gone");
                    }
                }
                true
            }
            ConnectionState::Unbound => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::new("abc", Secret::new("s3cret"), "Alice", GameRole::Client)
    }

    fn socket(conn: u64) -> (EndpointSocket, mpsc::Receiver<Outbound>) {
        socket_with_capacity(conn, OUTBOUND_QUEUE_LEN)
    }

    fn socket_with_capacity(conn: u64, capacity: usize) -> (EndpointSocket, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (EndpointSocket::new(ConnectionId::new(conn), tx), rx)
    }

    #[test]
    fn test_new_endpoint_is_unbound() {
        let ep = endpoint();
        assert!(!ep.is_bound());
        assert!(matches!(ep.connection(), ConnectionState::Unbound));
    }

    #[test]
    fn test_deliver_unbound_is_noop() {
        let ep = endpoint();
        assert_eq!(ep.deliver("hi".into()), Delivery::Unbound);
    }

    #[test]
    fn test_deliver_bound_queues_frame() {
        let mut ep = endpoint();
        let (sock, mut rx) = socket(1);
        ep.bind(sock);

        assert_eq!(ep.deliver("hello".into()), Delivery::Sent);
        assert_eq!(rx.try_recv().unwrap(), Outbound::Frame("hello".into()));
    }

    #[test]
    fn test_deliver_after_receiver_dropped_reports_closed() {
        let mut ep = endpoint();
        let (sock, rx) = socket(1);
        ep.bind(sock);
        drop(rx);

        assert_eq!(ep.deliver("hello".into()), Delivery::Closed);
    }

    #[test]
    fn test_deliver_to_full_queue_drops_frame() {
        let mut ep = endpoint();
        let (sock, mut rx) = socket_with_capacity(1, 2);
        ep.bind(sock);

        assert_eq!(ep.deliver("one".into()), Delivery::Sent);
        assert_eq!(ep.deliver("two".into()), Delivery::Sent);
        assert_eq!(ep.deliver("three".into()), Delivery::Full);
        assert!(ep.is_bound());

        assert_eq!(rx.try_recv().unwrap(), Outbound::Frame("one".into()));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Frame("two".into()));
        assert!(rx.try_recv().is_err());

        // Draining makes room again.
        assert_eq!(ep.deliver("four".into()), Delivery::Sent);
        assert_eq!(rx.try_recv().unwrap(), Outbound::Frame("four".into()));
    }

    #[test]
    fn test_close_on_full_queue_still_unbinds() {
        let mut ep = endpoint();
        let (sock, mut rx) = socket_with_capacity(1, 1);
        ep.bind(sock);
        assert_eq!(ep.deliver("stuck".into()), Delivery::Sent);

        assert!(ep.close(CloseCode::PolicyViolation));
        assert!(!ep.is_bound());

        // The queued frame is still there, then the channel ends.
        assert_eq!(rx.try_recv().unwrap(), Outbound::Frame("stuck".into()));
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_bind_replaces_previous_socket() {
        let mut ep = endpoint();
        let (first, _rx1) = socket(1);
        let (second, _rx2) = socket(2);

        assert!(ep.bind(first).is_none());
        let replaced = ep.bind(second).expect("should return old socket");

        assert_eq!(replaced.connection, ConnectionId::new(1));
    }

    #[test]
    fn test_unbind_ignores_stale_connection() {
        let mut ep = endpoint();
        let (first, _rx1) = socket(1);
        let (second, _rx2) = socket(2);
        ep.bind(first);
        ep.bind(second);

        // Connection 1's close arrives late.
        assert!(!ep.unbind(ConnectionId::new(1)));
        assert!(ep.is_bound());

        assert!(ep.unbind(ConnectionId::new(2)));
        assert!(!ep.is_bound());
    }

    #[test]
    fn test_unbind_when_unbound_is_noop() {
        let mut ep = endpoint();
        assert!(!ep.unbind(ConnectionId::new(1)));
    }

    #[test]
    fn test_close_sends_close_and_unbinds() {
        let mut ep = endpoint();
        let (sock, mut rx) = socket(1);
        ep.bind(sock);

        assert!(ep.close(CloseCode::Normal));

        assert!(!ep.is_bound());
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close(CloseCode::Normal));
    }

    #[test]
    fn test_secret_matches() {
        let ep = endpoint();
        assert!(ep.secret_matches("s3cret"));
        assert!(!ep.secret_matches("s3creT"));
    }
}
