//! Unified error type for Partyline.

use partyline_room::RoomError;
use partyline_session::SessionError;
use partyline_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum PartylineError {
    /// A transport-level error (bind, accept, upgrade, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The handshake carried no usable secret.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room or registry operation failed.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// The connection path isn't `/talk/{roomId}/{personalId}`.
    #[error("invalid connection path: {0}")]
    InvalidPath(String),
}
