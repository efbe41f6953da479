//! Error types for the room layer.

use partyline_protocol::ProtocolError;
use partyline_session::SessionError;

/// Errors that can occur during room and registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(String),

    /// The room's game has ended; it can be reused by its presenter but
    /// accepts no joins or sockets.
    #[error("room {0} is idle")]
    Idle(String),

    /// A request field failed validation. The message is safe to show to
    /// the caller.
    #[error("{0}")]
    InvalidInput(String),

    /// Endpoint lookup or secret check failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// An inbound frame did not start with a well-formed header.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[source] ProtocolError),

    /// An inbound frame claimed to come from someone else.
    #[error("sender {actual} included non-matching sender {claimed}")]
    SenderMismatch { actual: String, claimed: String },

    /// No endpoint in the room holds the given secret.
    #[error("secret not found in room {0}")]
    SecretNotFound(String),

    /// The secret belongs to an endpoint that isn't the presenter.
    #[error("secret does not belong to the presenter of room {0}")]
    NotPresenter(String),

    /// A server-originated message couldn't be serialized.
    #[error("could not encode message: {0}")]
    Encode(#[source] ProtocolError),

    /// The room's command channel is full or closed.
    #[error("room {0} is unavailable")]
    Unavailable(String),
}

impl RoomError {
    /// Whether the caller caused this error (bad input, bad credentials,
    /// unknown room) as opposed to the server failing.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Encode(_) | Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_client_error_classification() {
        assert!(RoomError::NotFound("QZVK".into()).is_client_error());
        assert!(RoomError::Idle("QZVK".into()).is_client_error());
        assert!(RoomError::InvalidInput("bad".into()).is_client_error());
        assert!(RoomError::SecretNotFound("QZVK".into()).is_client_error());
        assert!(RoomError::NotPresenter("QZVK".into()).is_client_error());
        assert!(RoomError::from(SessionError::MissingSecret).is_client_error());

        assert!(!RoomError::Unavailable("QZVK".into()).is_client_error());
        assert!(
            !RoomError::Encode(ProtocolError::InvalidMessage("x".into()))
                .is_client_error()
        );
    }

    #[test]
    fn test_invalid_input_message_is_verbatim() {
        let err = RoomError::InvalidInput("Game name not specified".into());
        assert_eq!(err.to_string(), "Game name not specified");
    }
}
