//! Wire protocol for Partyline.
//!
//! This crate defines the "language" that devices and the relay speak:
//!
//! - **Framing** ([`parse_frame`], [`serialize_frame`], [`MessageHeader`]):
//!   every routed frame is `<header-json>^<payload>`. The relay reads the
//!   header to find the receiver and never looks at the payload.
//! - **Lifecycle types** ([`GameInstanceProperties`], [`GameRole`],
//!   [`ExistingRoom`], request bodies): what the request layer sends in and
//!   gets back when starting, joining, or terminating a game.
//! - **Close codes** ([`CloseCode`]): how a misbehaving connection is told
//!   why it was dropped.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (text frames) → Protocol (header) → Room (routing by receiver id)
//! ```

mod error;
mod frame;
mod types;

pub use error::ProtocolError;
pub use frame::{DELIMITER, MessageHeader, parse_frame, parse_header, serialize_frame};
pub use types::{
    CloseCode, ErrorResponse, ExistingRoom, GameInstanceProperties, GameRole,
    JoinGameRequest, StartGameRequest, TerminateGameRequest,
    TerminateGameResponse,
};
