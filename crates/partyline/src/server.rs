//! `PartylineServer` builder and server loop.
//!
//! This is the entry point for running a relay. It ties together all the
//! layers: transport → protocol → session → room, plus the background
//! sweeps that keep the registry and telemetry current.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use partyline_interval::{IntervalConfig, spawn_periodic};
use partyline_room::{RoomConfig, RoomRegistry};
use partyline_telemetry::{Telemetry, TelemetryConfig};
use partyline_transport::{DEFAULT_HANDSHAKE_TIMEOUT, Transport, WebSocketTransport};
use tokio::task::JoinHandle;

use crate::PartylineError;
use crate::api::ApiHandler;
use crate::handler::handle_connection;

/// How often inactive rooms are purged unless configured otherwise.
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState {
    pub(crate) registry: Arc<RoomRegistry>,
}

/// Builder for configuring and starting a Partyline server.
///
/// # Example
///
/// ```rust,ignore
/// use partyline::prelude::*;
///
/// let server = PartylineServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// let api = server.api();
/// server.run().await
/// ```
pub struct PartylineServerBuilder {
    bind_addr: String,
    room_config: RoomConfig,
    telemetry_config: TelemetryConfig,
    purge_interval: Duration,
    handshake_timeout: Duration,
}

impl PartylineServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            room_config: RoomConfig::default(),
            telemetry_config: TelemetryConfig::default(),
            purge_interval: DEFAULT_PURGE_INTERVAL,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the room configuration.
    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Sets the telemetry configuration.
    pub fn telemetry_config(mut self, config: TelemetryConfig) -> Self {
        self.telemetry_config = config;
        self
    }

    /// Sets how often inactive rooms are purged.
    pub fn purge_interval(mut self, interval: Duration) -> Self {
        self.purge_interval = interval;
        self
    }

    /// Sets how long a new socket has to finish its WebSocket upgrade.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Binds the listener and builds the registry.
    pub async fn build(self) -> Result<PartylineServer, PartylineError> {
        let transport = WebSocketTransport::bind(&self.bind_addr)
            .await?
            .with_handshake_timeout(self.handshake_timeout);

        let cpu_sample_interval = self.telemetry_config.cpu_sample_interval;
        let telemetry = Arc::new(Telemetry::new(self.telemetry_config));
        let registry = Arc::new(RoomRegistry::new(self.room_config, telemetry));

        Ok(PartylineServer {
            transport,
            state: Arc::new(ServerState { registry }),
            purge_interval: self.purge_interval,
            cpu_sample_interval,
        })
    }
}

impl Default for PartylineServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Partyline server.
///
/// Call [`run()`](Self::run) to start accepting connections. Grab an
/// [`ApiHandler`] first with [`api()`](Self::api) to serve start, join,
/// terminate and health requests from whatever HTTP front end you use.
pub struct PartylineServer {
    transport: WebSocketTransport,
    state: Arc<ServerState>,
    purge_interval: Duration,
    cpu_sample_interval: Duration,
}

impl PartylineServer {
    /// Creates a new builder.
    pub fn builder() -> PartylineServerBuilder {
        PartylineServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, PartylineError> {
        Ok(self.transport.local_addr()?)
    }

    /// The registry every connection and request goes through.
    pub fn registry(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.state.registry)
    }

    /// A request handler sharing this server's registry.
    pub fn api(&self) -> ApiHandler {
        ApiHandler::new(self.registry())
    }

    /// Runs the server accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), PartylineError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the server accept loop until `shutdown` completes, then stops
    /// the background sweeps and closes every room.
    ///
    /// Each accepted stream gets its own handler task, which also runs the
    /// WebSocket upgrade.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), PartylineError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "partyline server running");

        let background = self.spawn_background();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(incoming) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(incoming, state).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                () = &mut shutdown => break,
            }
        }

        tracing::info!("partyline server shutting down");
        for task in background {
            task.abort();
        }
        self.transport.shutdown().await?;
        self.state.registry.shutdown_all().await;
        Ok(())
    }

    /// Starts the purge sweep and the CPU sampler.
    fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let registry = Arc::clone(&self.state.registry);
        let purge = spawn_periodic(
            IntervalConfig::every("purge", self.purge_interval),
            move || {
                let registry = Arc::clone(&registry);
                async move {
                    let purged = registry.purge_inactive_rooms().await;
                    let rooms = registry.room_count().await;
                    tracing::info!(rooms, purged = purged.len(), "alive");
                }
            },
        );

        let telemetry = Arc::clone(self.state.registry.telemetry());
        let cpu = spawn_periodic(
            IntervalConfig::every("cpu-sample", self.cpu_sample_interval),
            move || {
                let telemetry = Arc::clone(&telemetry);
                async move {
                    telemetry.sample_cpu();
                }
            },
        );

        vec![purge, cpu]
    }
}
