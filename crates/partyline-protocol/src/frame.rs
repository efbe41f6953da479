//! Header-then-delimiter framing.
//!
//! Every routed frame looks like this:
//!
//! ```text
//! {"s":"k3j9x0a1b2c3","r":"p0q9r8s7t6u5"}^{"type":"Guess","word":"CLUSTER"}
//! └──────────── header JSON ────────────┘│└──────── opaque payload ───────┘
//!                                   delimiter
//! ```
//!
//! Clients depend on this exact shape, so it is preserved bit-for-bit: the
//! delimiter is the first `^` in the frame, the header is a JSON object that
//! never contains a `^`, and the sender/receiver fields are named `s` and
//! `r`. Extra header fields are allowed and ignored.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Separates the header JSON from the payload.
pub const DELIMITER: char = '^';

/// The routing header at the front of every frame.
///
/// Only the two addressing fields matter to the relay. Clients are free to
/// put more into the header; unknown fields are skipped when parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Endpoint id of the sender.
    #[serde(rename = "s")]
    pub sender: String,

    /// Endpoint id of the receiver.
    #[serde(rename = "r")]
    pub receiver: String,
}

impl MessageHeader {
    /// Creates a header addressed from `sender` to `receiver`.
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
        }
    }
}

/// Splits a raw frame into its header and the untouched payload text.
///
/// # Errors
/// - [`ProtocolError::MissingDelimiter`] if there is no `^`.
/// - [`ProtocolError::InvalidMessage`] if the text before the delimiter is
///   not a JSON object.
/// - [`ProtocolError::Decode`] if the object lacks string `s`/`r` fields.
pub fn parse_frame(raw: &str) -> Result<(MessageHeader, &str), ProtocolError> {
    let (header, payload) = raw
        .split_once(DELIMITER)
        .ok_or(ProtocolError::MissingDelimiter)?;

    // A derived struct would also accept `["a","b"]`; the wire contract is
    // an object.
    if !header.starts_with('{') {
        return Err(ProtocolError::InvalidMessage(
            "header must be a JSON object".into(),
        ));
    }

    let header: MessageHeader =
        serde_json::from_str(header).map_err(ProtocolError::Decode)?;
    Ok((header, payload))
}

/// Reads only the header of a raw frame.
pub fn parse_header(raw: &str) -> Result<MessageHeader, ProtocolError> {
    parse_frame(raw).map(|(header, _)| header)
}

/// Builds a frame for a server-originated message.
///
/// The payload is serialized as JSON after the delimiter, which is the same
/// shape clients produce for their own messages.
pub fn serialize_frame<T: Serialize>(
    header: &MessageHeader,
    payload: &T,
) -> Result<String, ProtocolError> {
    let header_json =
        serde_json::to_string(header).map_err(ProtocolError::Encode)?;
    if header_json.contains(DELIMITER) {
        return Err(ProtocolError::InvalidMessage(format!(
            "header may not contain '{DELIMITER}'"
        )));
    }
    let payload_json =
        serde_json::to_string(payload).map_err(ProtocolError::Encode)?;
    Ok(format!("{header_json}{DELIMITER}{payload_json}"))
}
