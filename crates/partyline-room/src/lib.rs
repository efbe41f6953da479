//! Rooms and the registry that tracks them.
//!
//! Each room runs as an isolated Tokio task (actor model) owning its
//! endpoints and routing frames between them by the receiver id in each
//! frame's header.
//!
//! # Key types
//!
//! - [`RoomRegistry`]: starts, joins, clears, looks up, and purges rooms
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`Room`]: the state a room actor owns
//! - [`RoomConfig`]: inactivity window, name and code limits
//! - [`RoomError`]: everything that can go wrong, split into client and
//!   server faults by [`RoomError::is_client_error`]

mod config;
mod error;
mod handle;
mod registry;
mod room;

pub use config::RoomConfig;
pub use error::RoomError;
pub use handle::{JoinedRoom, RoomHandle};
pub use registry::RoomRegistry;
pub use room::{PRESENTER_NAME, Room, RoomInfo};
