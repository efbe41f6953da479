//! Partyline relay server binary.
//!
//! This binary only serves the game sockets under `/talk/`. Rooms are
//! created through [`ApiHandler`] (start, join, terminate, health), which
//! speaks typed requests rather than HTTP. Until an HTTP front end wraps
//! `server.api()` and routes those requests to it, no room can be created
//! and every socket is closed with 1008.
//!
//! # Usage
//!
//! ```bash
//! # Listen on 8080 with info-level logs
//! relay-server
//!
//! # Another port, chattier logs
//! PORT_OVERRIDE=9000 RUST_LOG=partyline=debug,info relay-server
//! ```

use partyline::prelude::*;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 8080;

/// Reads the listen port from `PORT_OVERRIDE`, if set.
fn port_from(value: Option<&str>) -> Result<u16, String> {
    match value.map(str::trim) {
        None | Some("") => Ok(DEFAULT_PORT),
        Some(raw) => raw
            .parse()
            .map_err(|e| format!("PORT_OVERRIDE must be a port number, got {raw:?}: {e}")),
    }
}

/// Binds the relay. Hand `server.api()` to an HTTP layer before running it.
async fn build_server(bind: &str) -> Result<PartylineServer, PartylineError> {
    PartylineServer::builder().bind(bind).build().await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let port = port_from(std::env::var("PORT_OVERRIDE").ok().as_deref())?;
    let server = build_server(&format!("0.0.0.0:{port}")).await?;
    tracing::info!("Listening on {}", server.local_addr()?);
    tracing::warn!("no HTTP front end is wired to the request API; rooms can't be created");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "could not listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("Stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_from_unset_uses_default() {
        assert_eq!(port_from(None), Ok(DEFAULT_PORT));
        assert_eq!(port_from(Some("  ")), Ok(DEFAULT_PORT));
    }

    #[test]
    fn test_port_from_override() {
        assert_eq!(port_from(Some("9000")), Ok(9000));
    }

    #[test]
    fn test_port_from_rejects_garbage() {
        assert!(port_from(Some("eighty")).is_err());
        assert!(port_from(Some("70000")).is_err());
    }

    #[tokio::test]
    async fn test_build_server_api_creates_rooms_in_its_registry() {
        let server = build_server("127.0.0.1:0").await.unwrap();
        let registry = server.registry();
        assert_eq!(registry.room_count().await, 0);

        let api = server.api();
        let props = api
            .start_game(StartGameRequest {
                game_name: "Lexible".into(),
                existing_room: None,
            })
            .await
            .unwrap();

        assert!(registry.get_room(&props.room_id).await.is_some());
    }
}
