//! # Partyline
//!
//! Relay backend for party games where one shared screen (the presenter)
//! and a handful of phones (the clients) talk through the server.
//!
//! The relay never interprets game traffic. It issues room codes and
//! credentials, binds each device's WebSocket to its endpoint, and forwards
//! every `<header>^<payload>` frame to the endpoint named in the header.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use partyline::prelude::*;
//!
//! # async fn run() -> Result<(), PartylineError> {
//! let server = PartylineServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//!
//! // Hand `api` to your HTTP layer for start / join / terminate / health.
//! let api = server.api();
//! # let _ = api;
//! server.run().await
//! # }
//! ```

mod api;
mod error;
mod handler;
mod server;

pub use api::{ApiError, ApiHandler, HealthParams, safe_call};
pub use error::PartylineError;
pub use handler::{TALK_PREFIX, parse_talk_path};
pub use server::{DEFAULT_PURGE_INTERVAL, PartylineServer, PartylineServerBuilder};

/// Everything needed to run a server and serve its requests.
pub mod prelude {
    pub use crate::{
        ApiError, ApiHandler, HealthParams, PartylineError, PartylineServer,
        PartylineServerBuilder,
    };
    pub use partyline_protocol::{
        CloseCode, ErrorResponse, ExistingRoom, GameInstanceProperties, GameRole,
        JoinGameRequest, MessageHeader, StartGameRequest, TerminateGameRequest,
        TerminateGameResponse,
    };
    pub use partyline_room::{RoomConfig, RoomError, RoomRegistry};
    pub use partyline_session::SECRET_PREFIX;
    pub use partyline_telemetry::{HealthQuery, HealthReport, TelemetryConfig};
}
