//! Request handlers for starting, joining, and ending games.
//!
//! These are plain async functions over typed request bodies so any HTTP
//! front end can wrap them: deserialize the body, call the handler, and
//! turn the result into a 200 or an [`ApiError`]'s status.

use std::future::Future;
use std::sync::Arc;

use partyline_protocol::{
    ErrorResponse, GameInstanceProperties, JoinGameRequest, StartGameRequest,
    TerminateGameRequest, TerminateGameResponse,
};
use partyline_room::{RoomError, RoomRegistry};
use partyline_telemetry::{EventKind, HealthQuery, HealthReport, now_ms};
use serde::Deserialize;

/// A failed request, ready to be sent back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status}: {error_message}")]
pub struct ApiError {
    /// 400 for caller mistakes, 500 for everything else.
    pub status: u16,
    pub error_message: String,
}

impl ApiError {
    pub fn is_client_error(&self) -> bool {
        self.status == 400
    }
}

impl From<ApiError> for ErrorResponse {
    fn from(err: ApiError) -> Self {
        ErrorResponse {
            error_message: err.error_message,
        }
    }
}

/// Query parameters of a health request, all optional.
///
/// Times are epoch milliseconds. Missing values fall back to the last
/// minute-wide buckets since the beginning of the log, up to now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct HealthParams {
    pub span: Option<u64>,
    pub earliest: Option<u64>,
    pub latest: Option<u64>,
}

impl From<HealthParams> for HealthQuery {
    fn from(params: HealthParams) -> Self {
        let defaults = HealthQuery::default();
        HealthQuery {
            earliest_ms: params.earliest.unwrap_or(defaults.earliest_ms),
            span_ms: params.span.unwrap_or(defaults.span_ms),
            latest_ms: params.latest.or(defaults.latest_ms),
        }
    }
}

/// Typed request layer over a [`RoomRegistry`].
#[derive(Clone)]
pub struct ApiHandler {
    registry: Arc<RoomRegistry>,
}

impl ApiHandler {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Starts a game, or resumes the presenter's `existing_room`.
    pub async fn start_game(
        &self,
        request: StartGameRequest,
    ) -> Result<GameInstanceProperties, ApiError> {
        if let Some(existing) = &request.existing_room {
            tracing::info!(room_id = %existing.id, presenter_id = %existing.presenter_id, "existing room specified");
        }
        let result = safe_call("StartGame", async {
            self.registry
                .start_game(&request.game_name, request.existing_room.as_ref())
                .await
        })
        .await;
        if let Err(e) = &result {
            if e.is_client_error() {
                self.registry.log_event(EventKind::BadRoomCreation, None, Some(&e.error_message));
            }
        }
        result
    }

    /// Adds a player to a running game.
    pub async fn join_game(
        &self,
        request: JoinGameRequest,
    ) -> Result<GameInstanceProperties, ApiError> {
        let result = safe_call("JoinGame", async {
            self.registry
                .join_game(&request.room_id, &request.player_name)
                .await
        })
        .await;
        if let Err(e) = &result {
            if e.is_client_error() {
                self.registry.log_event(EventKind::BadJoin, None, Some(&e.error_message));
            }
        }
        result
    }

    /// Ends the game in a room. Only its presenter may do this.
    pub async fn terminate_game(
        &self,
        request: TerminateGameRequest,
    ) -> Result<TerminateGameResponse, ApiError> {
        safe_call("TerminateGame", async {
            self.registry
                .clear_room(&request.room_id, &request.presenter_secret)
                .await?;
            Ok(TerminateGameResponse::ok())
        })
        .await
    }

    /// Builds a health report over the requested window.
    pub async fn health(&self, query: impl Into<HealthQuery>) -> Result<HealthReport, ApiError> {
        let query = query.into();
        self.registry.log_event(EventKind::GetRequest, None, Some("health"));
        safe_call("ShowHealth", async {
            Ok::<_, RoomError>(self.registry.get_health_data(query).await)
        })
        .await
    }
}

/// Runs a request and maps its failure to an [`ApiError`].
///
/// Client errors keep their message. Anything else is logged with a
/// timecode and the caller only sees that timecode, so the detail can be
/// found in the logs without leaking it.
pub async fn safe_call<T, F>(label: &str, run: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, RoomError>>,
{
    match run.await {
        Ok(value) => Ok(value),
        Err(e) if e.is_client_error() => {
            tracing::debug!(%label, error = %e, "request rejected");
            Err(ApiError {
                status: 400,
                error_message: e.to_string(),
            })
        }
        Err(e) => {
            let timecode = now_ms();
            tracing::error!(%label, %timecode, error = %e, "request failed");
            Err(ApiError {
                status: 500,
                error_message: format!(
                    "There was a server error in {label}.  Reference timecode {timecode}"
                ),
            })
        }
    }
}
