//! Error types for the session layer.

/// Errors that can occur while authenticating or binding an endpoint.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The connection offered no sub-protocol at all, so there is no
    /// secret to check.
    #[error("no secret offered in connection handshake")]
    MissingSecret,

    /// The first offered sub-protocol does not carry the `Secret` prefix.
    #[error("first offered protocol is not a secret")]
    MalformedSecret,

    /// No endpoint with this id exists in the room.
    #[error("no endpoint with id {id} in room {room_id}")]
    UnknownEndpoint { room_id: String, id: String },

    /// The alleged secret doesn't match what the server issued.
    /// Could be a stale secret, a typo, or a malicious attempt.
    #[error("bad secret for endpoint {id} in room {room_id}")]
    BadSecret { room_id: String, id: String },
}
