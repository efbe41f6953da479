//! Per-connection handler: binding, frame routing, and teardown.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Finish the WebSocket upgrade, bounded by the handshake timeout
//!   2. Read the secret from the offered sub-protocols
//!   3. Resolve `/talk/{roomId}/{personalId}` to a room and endpoint
//!   4. Bind the socket to the endpoint; a writer task drains its channel
//!   5. Loop: receive frames and hand them to the room for routing
//!   6. Unbind when the connection goes away

use std::sync::Arc;

use partyline_protocol::CloseCode;
use partyline_room::{RoomError, RoomHandle, RoomRegistry};
use partyline_session::{EndpointSocket, OUTBOUND_QUEUE_LEN, Outbound, secret_from_protocols};
use partyline_transport::{Connection, Inbound, Incoming, IncomingWebSocket, WebSocketConnection};
use tokio::sync::mpsc;

use crate::PartylineError;
use crate::server::ServerState;

/// Path prefix every game socket connects under.
pub const TALK_PREFIX: &str = "/talk/";

/// Splits `/talk/{roomId}/{personalId}` into its two ids.
///
/// A single trailing slash is tolerated; empty ids and extra segments are
/// not.
pub fn parse_talk_path(path: &str) -> Result<(&str, &str), PartylineError> {
    let invalid = || PartylineError::InvalidPath(path.to_owned());

    let rest = path.strip_prefix(TALK_PREFIX).ok_or_else(invalid)?;
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    let (room_id, personal_id) = rest.split_once('/').ok_or_else(invalid)?;
    if room_id.is_empty() || personal_id.is_empty() || personal_id.contains('/') {
        return Err(invalid());
    }
    Ok((room_id, personal_id))
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    incoming: IncomingWebSocket,
    state: Arc<ServerState>,
) -> Result<(), PartylineError> {
    let conn = Arc::new(incoming.upgrade().await?);
    let conn_id = conn.id();
    let registry = &state.registry;

    // --- Step 1: Bind ---
    let (room, personal_id) = match bind(&conn, registry).await {
        Ok(bound) => bound,
        Err(e) => {
            tracing::warn!(%conn_id, path = %conn.handshake().path, error = %e, "rejected socket");
            let _ = conn.close(CloseCode::PolicyViolation).await;
            return Err(e);
        }
    };
    tracing::info!(%conn_id, room_id = %room.room_id(), %personal_id, "socket bound");

    // --- Step 2: Frame loop ---
    let close_code = read_frames(&conn, &room, &personal_id, registry).await;

    // --- Step 3: Teardown ---
    // Close before unbinding, or the writer's default close could win.
    if let Some(code) = close_code {
        let _ = conn.close(code).await;
    }
    room.remove_socket(&personal_id, conn_id).await.ok();
    tracing::debug!(%conn_id, room_id = %room.room_id(), %personal_id, "connection closed");
    Ok(())
}

/// Authenticates the connection and binds it to its endpoint.
///
/// Returns the room and the endpoint id the socket now speaks for.
async fn bind(
    conn: &Arc<WebSocketConnection>,
    registry: &RoomRegistry,
) -> Result<(RoomHandle, String), PartylineError> {
    let handshake = conn.handshake();

    // No secret means no lookup at all.
    let secret = secret_from_protocols(&handshake.protocols)?;
    let (room_id, personal_id) = parse_talk_path(&handshake.path)?;

    let Some(room) = registry.get_room(room_id).await else {
        registry.report_error("socket");
        return Err(RoomError::NotFound(room_id.to_owned()).into());
    };

    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_LEN);
    let socket = EndpointSocket::new(conn.id(), tx);
    if let Err(e) = room.set_socket(personal_id, secret.expose(), socket).await {
        registry.report_error("socket");
        return Err(e.into());
    }

    tokio::spawn(write_outbound(Arc::clone(conn), rx));
    Ok((room, personal_id.to_owned()))
}

/// Drains an endpoint's outbound channel into the socket.
///
/// Ends on an explicit close, or when the channel's sender is dropped
/// because the endpoint was unbound, replaced, or its room went away.
async fn write_outbound(conn: Arc<WebSocketConnection>, mut rx: mpsc::Receiver<Outbound>) {
    let conn_id = conn.id();
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Frame(text) => {
                if let Err(e) = conn.send_text(&text).await {
                    tracing::debug!(%conn_id, error = %e, "send failed, stopping writer");
                    return;
                }
            }
            Outbound::Close(code) => {
                tracing::debug!(%conn_id, code = code.code(), "closing socket");
                let _ = conn.close(code).await;
                return;
            }
        }
    }
    let _ = conn.close(CloseCode::Normal).await;
}

/// Reads frames until the peer goes away or breaks the framing rules.
///
/// Returns the close code to send, or `None` if the connection is already
/// gone.
async fn read_frames(
    conn: &WebSocketConnection,
    room: &RoomHandle,
    personal_id: &str,
    registry: &RoomRegistry,
) -> Option<CloseCode> {
    let conn_id = conn.id();
    loop {
        let inbound = match conn.recv().await {
            Ok(Some(inbound)) => inbound,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                return None;
            }
        };
        registry.report_received_message(inbound.len());

        // Some clients send frames as binary messages. They are routed like
        // text as long as they hold UTF-8.
        let text = match inbound {
            Inbound::Text(text) => text,
            Inbound::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    tracing::warn!(%conn_id, %personal_id, "binary frame is not UTF-8, closing");
                    return Some(CloseCode::UnsupportedData);
                }
            },
        };

        match room.receive_message(personal_id, text).await {
            Ok(()) => {}
            Err(e @ (RoomError::MalformedFrame(_) | RoomError::SenderMismatch { .. })) => {
                tracing::warn!(%conn_id, room_id = %room.room_id(), error = %e, "unroutable frame, closing");
                return Some(CloseCode::UnsupportedData);
            }
            Err(e) => {
                tracing::debug!(%conn_id, room_id = %room.room_id(), error = %e, "room unavailable");
                return Some(CloseCode::Normal);
            }
        }
    }
}
