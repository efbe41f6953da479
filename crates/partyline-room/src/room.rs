//! Room state: endpoints, routing, and the idle/active lifecycle.
//!
//! [`Room`] is plain synchronous state. It is owned by a room actor (see
//! `handle.rs`), which is what serializes access to it; nothing here locks
//! or awaits.
//!
//! # Lifecycle
//!
//! ```text
//!   created ──(clear)──→ idle ──(reactivate by presenter)──→ active
//!      │                   │
//!      └──── purged when no frame has been routed for the window ────┘
//! ```

use std::collections::HashMap;
use std::time::Duration;

use partyline_protocol::{
    CloseCode, GameRole, MessageHeader, parse_header, serialize_frame,
};
use partyline_session::{
    Delivery, Endpoint, EndpointSocket, Outbound, Secret, SessionError,
};
use partyline_telemetry::Reporter;
use partyline_transport::ConnectionId;
use serde::Serialize;
use tokio::time::Instant;

use crate::RoomError;

/// Display name given to the presenter endpoint.
pub const PRESENTER_NAME: &str = "presenter";

/// A snapshot of room metadata.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room_id: String,
    pub game_name: String,
    pub presenter_id: String,
    pub idle: bool,
    /// Whether a frame was routed within the inactivity window.
    pub active: bool,
    /// Non-presenter endpoints with a live socket.
    pub user_count: usize,
    /// All endpoints, presenter included.
    pub endpoint_count: usize,
    pub last_message_time: Instant,
}

/// One game session and everyone in it.
#[derive(Debug)]
pub struct Room {
    id: String,
    game_name: String,
    presenter_id: String,
    last_message_time: Instant,
    idle: bool,
    endpoints: HashMap<String, Endpoint>,
    inactivity_window: Duration,
    reporter: Reporter,
}

impl Room {
    /// Creates a room owned by the given presenter.
    pub fn new(
        id: impl Into<String>,
        game_name: impl Into<String>,
        presenter_id: impl Into<String>,
        presenter_secret: Secret,
        inactivity_window: Duration,
        reporter: Reporter,
    ) -> Self {
        let presenter_id = presenter_id.into();
        let mut room = Self {
            id: id.into(),
            game_name: game_name.into(),
            presenter_id: presenter_id.clone(),
            last_message_time: Instant::now(),
            idle: false,
            endpoints: HashMap::new(),
            inactivity_window,
            reporter,
        };
        room.add_endpoint(
            presenter_id,
            presenter_secret,
            PRESENTER_NAME,
            GameRole::Presenter,
        );
        room
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn game_name(&self) -> &str {
        &self.game_name
    }

    pub fn presenter_id(&self) -> &str {
        &self.presenter_id
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn last_message_time(&self) -> Instant {
        self.last_message_time
    }

    pub fn endpoint(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.get(id)
    }

    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Inserts an endpoint, replacing any existing one with the same id.
    pub fn add_endpoint(
        &mut self,
        id: impl Into<String>,
        secret: Secret,
        display_name: impl Into<String>,
        role: GameRole,
    ) {
        let endpoint = Endpoint::new(id, secret, display_name, role);
        if let Some(mut previous) = self.endpoints.insert(endpoint.id.clone(), endpoint) {
            previous.close(CloseCode::PolicyViolation);
        }
    }

    /// Adds a client endpoint, unless the room is idle.
    pub fn join(
        &mut self,
        id: impl Into<String>,
        secret: Secret,
        display_name: impl Into<String>,
    ) -> Result<(), RoomError> {
        if self.idle {
            return Err(RoomError::Idle(self.id.clone()));
        }
        self.add_endpoint(id, secret, display_name, GameRole::Client);
        Ok(())
    }

    /// Returns `true` if `id` is this room's presenter and `secret` is its
    /// secret.
    pub fn validate_presenter(&self, id: &str, secret: &str) -> bool {
        id == self.presenter_id
            && self
                .endpoints
                .get(id)
                .is_some_and(|ep| ep.is_presenter() && ep.secret_matches(secret))
    }

    /// Brings an idle (or active) room back for a new game, if the
    /// presenter credentials check out.
    pub fn reactivate(&mut self, game_name: &str, presenter_id: &str, secret: &str) -> bool {
        if !self.validate_presenter(presenter_id, secret) {
            return false;
        }
        self.game_name = game_name.to_owned();
        self.idle = false;
        self.last_message_time = Instant::now();
        true
    }

    // -----------------------------------------------------------------------
    // Sockets
    // -----------------------------------------------------------------------

    /// Binds a socket to an endpoint after checking its secret.
    ///
    /// A previously bound socket is told to close and replaced.
    pub fn set_socket(
        &mut self,
        id: &str,
        alleged_secret: &str,
        socket: EndpointSocket,
    ) -> Result<(), RoomError> {
        if self.idle {
            return Err(RoomError::Idle(self.id.clone()));
        }
        let endpoint =
            self.endpoints
                .get_mut(id)
                .ok_or_else(|| SessionError::UnknownEndpoint {
                    room_id: self.id.clone(),
                    id: id.to_owned(),
                })?;
        if !endpoint.secret_matches(alleged_secret) {
            return Err(SessionError::BadSecret {
                room_id: self.id.clone(),
                id: id.to_owned(),
            }
            .into());
        }

        let connection = socket.connection;
        if let Some(previous) = endpoint.bind(socket) {
            let _ = previous.sender.try_send(Outbound::Close(CloseCode::Normal));
            tracing::debug!(
                room_id = %self.id,
                endpoint_id = %id,
                old = %previous.connection,
                new = %connection,
                "socket replaced"
            );
        }
        tracing::info!(room_id = %self.id, endpoint_id = %id, %connection, "socket bound");
        Ok(())
    }

    /// Detaches `connection` from an endpoint, if it is still the bound one.
    pub fn remove_socket(&mut self, id: &str, connection: ConnectionId) -> bool {
        let removed = self
            .endpoints
            .get_mut(id)
            .is_some_and(|ep| ep.unbind(connection));
        if removed {
            tracing::debug!(room_id = %self.id, endpoint_id = %id, %connection, "socket removed");
        }
        removed
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    /// Routes a frame received from `sender_id`'s socket.
    ///
    /// The frame is forwarded unmodified to the receiver named in its
    /// header. The header's sender must be the endpoint the socket is bound
    /// to; anything else is spoofing.
    pub fn receive_message(&mut self, sender_id: &str, raw: &str) -> Result<(), RoomError> {
        let header = parse_header(raw).map_err(RoomError::MalformedFrame)?;
        if header.sender != sender_id {
            return Err(RoomError::SenderMismatch {
                actual: sender_id.to_owned(),
                claimed: header.sender,
            });
        }
        self.forward(&header.receiver, raw.to_owned());
        Ok(())
    }

    /// Sends a server-originated message in the same framing clients use.
    pub fn send_message<T: Serialize>(
        &mut self,
        receiver_id: &str,
        sender_id: &str,
        message: &T,
    ) -> Result<(), RoomError> {
        let header = MessageHeader::new(sender_id, receiver_id);
        let frame = serialize_frame(&header, message).map_err(RoomError::Encode)?;
        self.forward(receiver_id, frame);
        Ok(())
    }

    /// Delivers an already-framed message. Missing or unbound receivers
    /// are logged and the frame is dropped.
    pub fn forward(&mut self, receiver_id: &str, frame: String) {
        self.last_message_time = Instant::now();
        self.reporter.report_sent_message(frame.len());

        let Some(endpoint) = self.endpoints.get(receiver_id) else {
            tracing::warn!(room_id = %self.id, %receiver_id, "no endpoint found for receiver");
            return;
        };
        match endpoint.deliver(frame) {
            Delivery::Sent => {}
            Delivery::Unbound => {
                tracing::debug!(room_id = %self.id, %receiver_id, "no socket for receiver, dropping");
            }
            Delivery::Closed => {
                tracing::debug!(room_id = %self.id, %receiver_id, "receiver socket closed, dropping");
            }
            Delivery::Full => {
                tracing::warn!(room_id = %self.id, %receiver_id, "receiver not keeping up, dropping");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Ending a game
    // -----------------------------------------------------------------------

    /// Ends the current game: everyone but the presenter is disconnected
    /// and removed, and the room goes idle.
    pub fn clear(&mut self) {
        let presenter_id = self.presenter_id.clone();
        self.endpoints.retain(|id, endpoint| {
            if *id == presenter_id {
                return true;
            }
            endpoint.close(CloseCode::Normal);
            false
        });
        self.idle = true;
        tracing::info!(room_id = %self.id, "room cleared");
    }

    /// Clears the room on behalf of whoever holds `presenter_secret`.
    pub fn terminate(&mut self, presenter_secret: &str) -> Result<(), RoomError> {
        let holder = self
            .endpoints
            .values()
            .find(|ep| ep.secret_matches(presenter_secret))
            .ok_or_else(|| RoomError::SecretNotFound(self.id.clone()))?;
        if holder.id != self.presenter_id {
            return Err(RoomError::NotPresenter(self.id.clone()));
        }
        self.clear();
        Ok(())
    }

    /// Closes every live socket, presenter included.
    pub fn close_all(&mut self, code: CloseCode) {
        for endpoint in self.endpoints.values_mut() {
            endpoint.close(code);
        }
    }

    // -----------------------------------------------------------------------
    // Derived state
    // -----------------------------------------------------------------------

    /// Whether a frame was routed within the inactivity window.
    pub fn is_active(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_message_time) < self.inactivity_window
    }

    /// Non-presenter endpoints with a live socket.
    pub fn user_count(&self) -> usize {
        self.endpoints
            .values()
            .filter(|ep| !ep.is_presenter() && ep.is_bound())
            .count()
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.id.clone(),
            game_name: self.game_name.clone(),
            presenter_id: self.presenter_id.clone(),
            idle: self.idle,
            active: self.is_active(Instant::now()),
            user_count: self.user_count(),
            endpoint_count: self.endpoints.len(),
            last_message_time: self.last_message_time,
        }
    }
}
