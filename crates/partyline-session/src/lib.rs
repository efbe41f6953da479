//! Endpoint identity and connection binding for Partyline.
//!
//! This crate answers "who is on the other end of this socket?":
//!
//! 1. **Identity**: issuing room codes, endpoint ids, and secrets
//!    ([`generate_room_code`], [`generate_personal_id`],
//!    [`generate_personal_secret`])
//! 2. **Authentication**: the secret is the only proof of identity; it is
//!    carried in the connection handshake ([`secret_from_protocols`]) and
//!    compared in constant time ([`Secret::matches`])
//! 3. **Connection state**: an [`Endpoint`] outlives any single socket, so
//!    a device that drops off Wi-Fi can bind a new one
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)  ← owns endpoints, routes frames between them
//!     ↕
//! Session Layer (this crate)  ← identity, secrets, socket binding
//!     ↕
//! Protocol / Transport (below)  ← GameRole, CloseCode, ConnectionId
//! ```

mod auth;
mod endpoint;
mod error;
mod ids;

pub use auth::{SECRET_PREFIX, Secret, secret_from_protocols};
pub use endpoint::{
    ConnectionState, Delivery, Endpoint, EndpointSender, EndpointSocket,
    OUTBOUND_QUEUE_LEN, Outbound,
};
pub use error::SessionError;
pub use ids::{
    PERSONAL_ID_LEN, PERSONAL_SECRET_LEN, ROOM_CODE_ALPHABET, ROOM_CODE_LEN,
    generate_personal_id, generate_personal_secret, generate_room_code,
};
