//! Lifecycle types exchanged with the request layer, and close codes.
//!
//! Field names follow the camelCase JSON that lobby and game clients
//! already send, hence `#[serde(rename_all = "camelCase")]` throughout.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Roles and instance properties
// ---------------------------------------------------------------------------

/// Which side of a game an endpoint is on.
///
/// Every room has exactly one `Presenter` (the device showing the shared
/// screen, and the room's owner). Everyone else is a `Client`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameRole {
    Presenter,
    Client,
}

impl fmt::Display for GameRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Presenter => write!(f, "Presenter"),
            Self::Client => write!(f, "Client"),
        }
    }
}

/// What a device needs to know to open its socket after starting or
/// joining a game.
///
/// `personal_secret` is only ever sent here, once, and is then presented
/// back by the device in its connection handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameInstanceProperties {
    pub game_name: String,
    pub role: GameRole,
    pub room_id: String,
    pub presenter_id: String,
    pub personal_id: String,
    pub personal_secret: String,
}

/// Credentials a presenter sends to resume a room it already owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingRoom {
    pub id: String,
    pub presenter_id: String,
    pub presenter_secret: String,
}

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

/// Body of a start-game request.
///
/// A missing `gameName` deserializes as empty and is rejected by the
/// registry with a readable message rather than a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameRequest {
    #[serde(default)]
    pub game_name: String,
    #[serde(default)]
    pub existing_room: Option<ExistingRoom>,
}

/// Body of a join-game request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGameRequest {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub player_name: String,
}

/// Body of a terminate-game request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateGameRequest {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub presenter_secret: String,
}

/// Acknowledgement for a terminate-game request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminateGameResponse {
    pub message: String,
}

impl TerminateGameResponse {
    pub fn ok() -> Self {
        Self {
            message: "OK".into(),
        }
    }
}

/// Error body returned to the request layer's caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_message: String,
}

// ---------------------------------------------------------------------------
// Close codes
// ---------------------------------------------------------------------------

/// WebSocket close codes the relay uses to end a connection.
///
/// The distinct codes let a client tell "you were never allowed in"
/// (policy) apart from "you sent something I can't route" (data).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// 1000: orderly shutdown, e.g. the presenter ended the game.
    Normal,
    /// 1003: malformed frame or spoofed sender.
    UnsupportedData,
    /// 1008: missing/bad secret, unknown or idle room, unknown endpoint.
    PolicyViolation,
}

impl CloseCode {
    /// Returns the numeric close code sent on the wire.
    pub fn code(self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::UnsupportedData => 1003,
            Self::PolicyViolation => 1008,
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_instance_properties_uses_camel_case() {
        let props = GameInstanceProperties {
            game_name: "Lexible".into(),
            role: GameRole::Presenter,
            room_id: "QZVK".into(),
            presenter_id: "abc".into(),
            personal_id: "abc".into(),
            personal_secret: "s3cret".into(),
        };

        let json = serde_json::to_value(&props).unwrap();

        assert_eq!(json["gameName"], "Lexible");
        assert_eq!(json["roomId"], "QZVK");
        assert_eq!(json["presenterId"], "abc");
        assert_eq!(json["personalSecret"], "s3cret");
        assert_eq!(json["role"], "Presenter");
    }

    #[test]
    fn test_start_game_request_parses_existing_room() {
        let body = r#"{
            "gameName": "Testato",
            "existingRoom": {"id": "BCDF", "presenterId": "p", "presenterSecret": "s"}
        }"#;

        let req: StartGameRequest = serde_json::from_str(body).unwrap();

        assert_eq!(req.game_name, "Testato");
        let existing = req.existing_room.expect("existing room");
        assert_eq!(existing.id, "BCDF");
        assert_eq!(existing.presenter_secret, "s");
    }

    #[test]
    fn test_start_game_request_missing_fields_default_empty() {
        let req: StartGameRequest = serde_json::from_str("{}").unwrap();
        assert!(req.game_name.is_empty());
        assert!(req.existing_room.is_none());
    }

    #[test]
    fn test_error_response_field_name() {
        let body = ErrorResponse {
            error_message: "nope".into(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"errorMessage":"nope"}"#);
    }

    #[test]
    fn test_close_codes() {
        assert_eq!(CloseCode::Normal.code(), 1000);
        assert_eq!(CloseCode::UnsupportedData.code(), 1003);
        assert_eq!(CloseCode::PolicyViolation.code(), 1008);
    }
}
