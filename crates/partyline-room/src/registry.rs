//! Room registry: creates, reuses, finds, and purges rooms.

use std::collections::HashMap;
use std::sync::Arc;

use partyline_protocol::{ExistingRoom, GameInstanceProperties, GameRole};
use partyline_session::{
    generate_personal_id, generate_personal_secret, generate_room_code,
};
use partyline_telemetry::{
    EventKind, HealthQuery, HealthReport, Reporter, RoomSummary, Telemetry,
};
use tokio::sync::Mutex;

use crate::handle::spawn_room;
use crate::{RoomConfig, RoomError, RoomHandle};

/// Every live room, keyed by room code.
///
/// This is the entry point for room operations from higher layers (the
/// request layer and the connection handler). The map lock is only held
/// for lookups and inserts, never across a call into a room.
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, RoomHandle>>,
    config: RoomConfig,
    reporter: Reporter,
}

impl RoomRegistry {
    /// Creates a new, empty registry reporting into `telemetry`.
    pub fn new(config: RoomConfig, telemetry: Arc<Telemetry>) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            config,
            reporter: Reporter::new(telemetry),
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Game lifecycle
    // -----------------------------------------------------------------------

    /// Starts a game, reusing the presenter's previous room when it
    /// presents valid credentials for it.
    ///
    /// Reuse keeps the room code, presenter id, and secret, so devices that
    /// remember them carry on in the same room. Otherwise a fresh room is
    /// created under a code no live room holds.
    pub async fn start_game(
        &self,
        game_name: &str,
        existing_room: Option<&ExistingRoom>,
    ) -> Result<GameInstanceProperties, RoomError> {
        if game_name.is_empty() {
            return Err(RoomError::InvalidInput("Game name not specified".into()));
        }

        if let Some(existing) = existing_room {
            if self.reuse_room(game_name, existing).await {
                tracing::info!(room_id = %existing.id, %game_name, "reusing room");
                return Ok(GameInstanceProperties {
                    game_name: game_name.to_owned(),
                    role: GameRole::Presenter,
                    room_id: existing.id.clone(),
                    presenter_id: existing.presenter_id.clone(),
                    personal_id: existing.presenter_id.clone(),
                    personal_secret: existing.presenter_secret.clone(),
                });
            }
        }

        let personal_id = generate_personal_id();
        let personal_secret = generate_personal_secret();
        let issued_secret = personal_secret.expose().to_owned();

        let room_id = {
            let mut rooms = self.rooms.lock().await;
            let mut room_id = generate_room_code();
            while rooms.contains_key(&room_id) {
                room_id = generate_room_code();
            }
            let handle = spawn_room(
                room_id.clone(),
                game_name.to_owned(),
                personal_id.clone(),
                personal_secret,
                &self.config,
                self.reporter.clone(),
            );
            rooms.insert(room_id.clone(), handle);
            room_id
        };
        tracing::info!(%room_id, %game_name, "created room");

        Ok(GameInstanceProperties {
            game_name: game_name.to_owned(),
            role: GameRole::Presenter,
            room_id,
            presenter_id: personal_id.clone(),
            personal_id,
            personal_secret: issued_secret,
        })
    }

    async fn reuse_room(&self, game_name: &str, existing: &ExistingRoom) -> bool {
        let Some(handle) = self.get_room(&existing.id).await else {
            return false;
        };
        matches!(
            handle
                .reactivate(game_name, &existing.presenter_id, &existing.presenter_secret)
                .await,
            Ok(true)
        )
    }

    /// Adds a player to an existing, non-idle room.
    ///
    /// Input is validated before any room is touched, so a rejected join
    /// leaves every room exactly as it was.
    pub async fn join_game(
        &self,
        room_id: &str,
        player_name: &str,
    ) -> Result<GameInstanceProperties, RoomError> {
        if room_id.is_empty() || room_id.chars().count() > self.config.room_code_len {
            return Err(RoomError::InvalidInput(format!("Invalid Room Code ({room_id})")));
        }
        if player_name.is_empty()
            || player_name.chars().count() > self.config.max_player_name_len
        {
            return Err(RoomError::InvalidInput(format!(
                "Invalid Player name: ({player_name})"
            )));
        }

        let personal_id = generate_personal_id();
        let personal_secret = generate_personal_secret();
        let issued_secret = personal_secret.expose().to_owned();

        tracing::info!(%room_id, player_id = %personal_id, %player_name, "join");

        let Some(handle) = self.get_room(room_id).await else {
            self.reporter.report_error("Join invalid room id");
            return Err(RoomError::NotFound(room_id.to_owned()));
        };

        let joined = match handle.join(personal_id.clone(), personal_secret, player_name).await {
            Ok(joined) => joined,
            Err(e) => {
                if matches!(e, RoomError::Idle(_)) {
                    self.reporter.report_error("Join idle room");
                }
                return Err(e);
            }
        };

        Ok(GameInstanceProperties {
            game_name: joined.game_name,
            role: GameRole::Client,
            room_id: room_id.to_owned(),
            presenter_id: joined.presenter_id,
            personal_id,
            personal_secret: issued_secret,
        })
    }

    /// Ends the game in a room on behalf of its presenter.
    pub async fn clear_room(&self, room_id: &str, presenter_secret: &str) -> Result<(), RoomError> {
        let handle = self
            .get_room(room_id)
            .await
            .ok_or_else(|| RoomError::NotFound(room_id.to_owned()))?;
        handle.terminate(presenter_secret).await
    }

    /// Looks up a room by code.
    pub async fn get_room(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.lock().await.get(room_id).cloned()
    }

    /// Removes and shuts down every room with no traffic within the
    /// inactivity window. Returns the purged room codes.
    ///
    /// Candidates are picked from a snapshot, without the map lock. Each
    /// one is then asked to retire while the lock is held, and the room
    /// itself decides, so traffic or a reactivation that landed after the
    /// snapshot keeps it registered.
    pub async fn purge_inactive_rooms(&self) -> Vec<String> {
        tracing::info!("purging rooms");

        let mut candidates = Vec::new();
        for handle in self.room_handles().await {
            let stale = match handle.info().await {
                Ok(info) => !info.active,
                // The actor is gone; nothing can reach it anyway.
                Err(_) => true,
            };
            if stale {
                candidates.push(handle);
            }
        }

        let mut purged = Vec::with_capacity(candidates.len());
        let mut rooms = self.rooms.lock().await;
        for handle in candidates {
            let still_there = rooms
                .get(handle.room_id())
                .is_some_and(|current| current.same_room(&handle));
            if !still_there {
                continue;
            }
            let retired = handle.retire_if_inactive().await.unwrap_or(true);
            if retired {
                tracing::info!(room_id = %handle.room_id(), "purging inactive room");
                rooms.remove(handle.room_id());
                purged.push(handle.room_id().to_owned());
            } else {
                tracing::debug!(room_id = %handle.room_id(), "room became active, keeping");
            }
        }
        purged
    }

    /// Shuts down every room. Used when the server stops.
    pub async fn shutdown_all(&self) {
        let handles: Vec<RoomHandle> = self.rooms.lock().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            let _ = handle.shutdown().await;
        }
    }

    // -----------------------------------------------------------------------
    // Counters and health
    // -----------------------------------------------------------------------

    /// Returns cloned handles to all rooms.
    ///
    /// Useful when callers need to perform async operations on rooms
    /// without holding the registry lock.
    pub async fn room_handles(&self) -> Vec<RoomHandle> {
        self.rooms.lock().await.values().cloned().collect()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Room count plus active rooms and the players connected to them.
    pub async fn room_summary(&self) -> RoomSummary {
        let handles = self.room_handles().await;
        let mut summary = RoomSummary {
            room_count: handles.len(),
            ..RoomSummary::default()
        };
        for handle in handles {
            if let Ok(info) = handle.info().await {
                if info.active {
                    summary.active_rooms += 1;
                    summary.active_users += info.user_count;
                }
            }
        }
        summary
    }

    pub async fn get_health_data(&self, query: HealthQuery) -> HealthReport {
        let rooms = self.room_summary().await;
        self.reporter.telemetry().health_report(query, rooms)
    }

    // -----------------------------------------------------------------------
    // Telemetry pass-through
    // -----------------------------------------------------------------------

    /// A cloneable handle for recording events against this registry's
    /// telemetry.
    pub fn reporter(&self) -> Reporter {
        self.reporter.clone()
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        self.reporter.telemetry()
    }

    pub fn report_sent_message(&self, len: usize) {
        self.reporter.report_sent_message(len);
    }

    pub fn report_received_message(&self, len: usize) {
        self.reporter.report_received_message(len);
    }

    pub fn report_error(&self, category: &str) {
        self.reporter.report_error(category);
    }

    pub fn log_event(&self, kind: EventKind, value: Option<u64>, info: Option<&str>) {
        self.reporter.log_event(kind, value, info);
    }
}
