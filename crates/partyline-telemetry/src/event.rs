//! Telemetry event kinds and records.

use std::fmt;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A join request was rejected before reaching a room.
    BadJoin,
    /// A start request was rejected before creating a room.
    BadRoomCreation,
    /// Anything else that went wrong; `info` says what.
    GeneralError,
    /// A frame was forwarded to an endpoint; `value` is its length.
    MessageSend,
    /// A frame arrived from an endpoint; `value` is its length.
    MessageReceive,
    /// A plain GET was served; `info` names the resource.
    GetRequest,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::BadJoin => "BadJoin",
            Self::BadRoomCreation => "BadRoomCreation",
            Self::GeneralError => "GeneralError",
            Self::MessageSend => "MessageSend",
            Self::MessageReceive => "MessageReceive",
            Self::GetRequest => "GetRequest",
        }
    }

    /// Whether summaries split this kind by its `info` string.
    pub fn keyed_by_info(self) -> bool {
        matches!(self, Self::GeneralError | Self::GetRequest)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry in the event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub kind: EventKind,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub value: Option<u64>,
    pub info: Option<String>,
}

impl EventRecord {
    /// The summary key this record is counted under.
    ///
    /// `GeneralError` and `GetRequest` are split by `info`, so
    /// `GeneralError` with info `socket` is counted as `GeneralError_socket`.
    pub fn segment_key(&self) -> String {
        match (&self.info, self.kind.keyed_by_info()) {
            (Some(info), true) => format!("{}_{info}", self.kind),
            _ => self.kind.name().to_owned(),
        }
    }
}
