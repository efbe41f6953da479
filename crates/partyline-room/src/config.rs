//! Room configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration shared by the registry and every room it spawns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// A room with no routed frame for this long is purged by the next
    /// sweep.
    pub inactivity_window: Duration,

    /// Longest accepted player name, in characters.
    pub max_player_name_len: usize,

    /// Length of a room code. Join requests with a longer room id are
    /// rejected without a lookup.
    pub room_code_len: usize,

    /// Capacity of each room actor's command channel.
    pub command_channel_size: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            inactivity_window: Duration::from_secs(3600),
            max_player_name_len: 16,
            room_code_len: partyline_session::ROOM_CODE_LEN,
            command_channel_size: 64,
        }
    }
}

impl RoomConfig {
    pub fn with_inactivity_window(mut self, window: Duration) -> Self {
        self.inactivity_window = window;
        self
    }

    pub fn with_max_player_name_len(mut self, len: usize) -> Self {
        self.max_player_name_len = len;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_config_default() {
        let config = RoomConfig::default();
        assert_eq!(config.inactivity_window, Duration::from_secs(3600));
        assert_eq!(config.max_player_name_len, 16);
        assert_eq!(config.room_code_len, 4);
        assert_eq!(config.command_channel_size, 64);
    }

    #[test]
    fn test_room_config_builders() {
        let config = RoomConfig::default()
            .with_inactivity_window(Duration::from_secs(60))
            .with_max_player_name_len(8);
        assert_eq!(config.inactivity_window, Duration::from_secs(60));
        assert_eq!(config.max_player_name_len, 8);
    }
}
