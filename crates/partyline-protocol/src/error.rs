//! Error types for the protocol layer.
//!
//! Each crate in Partyline defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in the shape of a frame, not in
//! networking or room membership.

/// Errors that can occur while parsing or building frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame has no `^` delimiter, so there is no header to read.
    #[error("frame has no header delimiter")]
    MissingDelimiter,

    /// The text before the delimiter is not a valid header object.
    ///
    /// Common causes: malformed JSON, a missing `s` or `r` field, or
    /// non-string ids.
    #[error("malformed header: {0}")]
    Decode(#[source] serde_json::Error),

    /// Serializing a header or payload failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// The message passes deserialization but violates a framing rule,
    /// e.g. a header that would itself contain the delimiter.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
