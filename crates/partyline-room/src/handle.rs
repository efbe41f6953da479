//! Room actor: an isolated Tokio task that owns a [`Room`].
//!
//! Each room runs in its own task, communicating with the outside world
//! through an mpsc channel. Every mutation is a command processed in
//! arrival order, so two sockets binding at once, or a join racing a
//! clear, never interleave.

use partyline_protocol::{CloseCode, MessageHeader, serialize_frame};
use partyline_session::{EndpointSocket, Secret};
use partyline_telemetry::Reporter;
use partyline_transport::ConnectionId;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::{Room, RoomConfig, RoomError, RoomInfo};

/// What a successful join hands back, read atomically with the join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRoom {
    pub game_name: String,
    pub presenter_id: String,
}

/// Commands sent to a room actor through its channel.
///
/// The `oneshot::Sender` in most variants is a reply channel: the caller
/// sends a command and waits for the response on it.
pub(crate) enum RoomCommand {
    Join {
        id: String,
        secret: Secret,
        display_name: String,
        reply: oneshot::Sender<Result<JoinedRoom, RoomError>>,
    },
    Reactivate {
        game_name: String,
        presenter_id: String,
        secret: String,
        reply: oneshot::Sender<bool>,
    },
    SetSocket {
        id: String,
        secret: String,
        socket: EndpointSocket,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    /// Fire-and-forget: the connection is already gone.
    RemoveSocket {
        id: String,
        connection: ConnectionId,
    },
    Receive {
        sender_id: String,
        frame: String,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    /// A server-originated frame, already serialized.
    Forward {
        receiver_id: String,
        frame: String,
    },
    Terminate {
        presenter_secret: String,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },
    /// Stops the room if it is inactive when the command is processed.
    RetireIfInactive {
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

/// Handle to a running room actor. Used to send commands to it.
///
/// This is cheap to clone; it's just an `mpsc::Sender` wrapper. The
/// registry holds one of these per room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: String,
    sender: mpsc::Sender<RoomCommand>,
}

impl std::fmt::Debug for RoomCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Join { .. } => "Join",
            Self::Reactivate { .. } => "Reactivate",
            Self::SetSocket { .. } => "SetSocket",
            Self::RemoveSocket { .. } => "RemoveSocket",
            Self::Receive { .. } => "Receive",
            Self::Forward { .. } => "Forward",
            Self::Terminate { .. } => "Terminate",
            Self::GetInfo { .. } => "GetInfo",
            Self::RetireIfInactive { .. } => "RetireIfInactive",
            Self::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

impl RoomHandle {
    /// Returns the room's code.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Whether both handles drive the same actor.
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn unavailable(&self) -> RoomError {
        RoomError::Unavailable(self.room_id.clone())
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.sender.send(cmd).await.map_err(|_| self.unavailable())
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> Result<T, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make(reply_tx)).await?;
        reply_rx.await.map_err(|_| self.unavailable())
    }

    /// Adds a client endpoint unless the room is idle, returning the
    /// room's current game and presenter.
    pub async fn join(
        &self,
        id: impl Into<String>,
        secret: Secret,
        display_name: impl Into<String>,
    ) -> Result<JoinedRoom, RoomError> {
        let (id, display_name) = (id.into(), display_name.into());
        self.request(|reply| RoomCommand::Join {
            id,
            secret,
            display_name,
            reply,
        })
        .await?
    }

    /// Validates the presenter and, if valid, starts a new game in this
    /// room. Returns whether the room was reactivated.
    pub async fn reactivate(
        &self,
        game_name: &str,
        presenter_id: &str,
        secret: &str,
    ) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::Reactivate {
            game_name: game_name.to_owned(),
            presenter_id: presenter_id.to_owned(),
            secret: secret.to_owned(),
            reply,
        })
        .await
    }

    pub async fn set_socket(
        &self,
        id: &str,
        alleged_secret: &str,
        socket: EndpointSocket,
    ) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::SetSocket {
            id: id.to_owned(),
            secret: alleged_secret.to_owned(),
            socket,
            reply,
        })
        .await?
    }

    pub async fn remove_socket(&self, id: &str, connection: ConnectionId) -> Result<(), RoomError> {
        self.send(RoomCommand::RemoveSocket {
            id: id.to_owned(),
            connection,
        })
        .await
    }

    /// Routes a frame that arrived on `sender_id`'s socket.
    pub async fn receive_message(&self, sender_id: &str, frame: String) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Receive {
            sender_id: sender_id.to_owned(),
            frame,
            reply,
        })
        .await?
    }

    /// Sends a server-originated message to `receiver_id`.
    pub async fn send_message<T: Serialize>(
        &self,
        receiver_id: &str,
        sender_id: &str,
        message: &T,
    ) -> Result<(), RoomError> {
        let header = MessageHeader::new(sender_id, receiver_id);
        let frame = serialize_frame(&header, message).map_err(RoomError::Encode)?;
        self.send(RoomCommand::Forward {
            receiver_id: receiver_id.to_owned(),
            frame,
        })
        .await
    }

    /// Clears the room if `presenter_secret` belongs to its presenter.
    pub async fn terminate(&self, presenter_secret: &str) -> Result<(), RoomError> {
        self.request(|reply| RoomCommand::Terminate {
            presenter_secret: presenter_secret.to_owned(),
            reply,
        })
        .await?
    }

    /// Requests a snapshot of the room.
    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        self.request(|reply| RoomCommand::GetInfo { reply }).await
    }

    /// Stops the room, closing every socket, if no frame was routed within
    /// the inactivity window. Returns whether it stopped.
    ///
    /// The check and the stop happen in one actor step, so a frame or a
    /// reactivation queued ahead of this command keeps the room alive.
    pub async fn retire_if_inactive(&self) -> Result<bool, RoomError> {
        self.request(|reply| RoomCommand::RetireIfInactive { reply }).await
    }

    /// Tells the room to close every socket and stop.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.send(RoomCommand::Shutdown).await
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    room: Room,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    /// Runs the actor loop, processing commands until shutdown or until
    /// every handle is dropped.
    async fn run(mut self) {
        tracing::info!(room_id = %self.room.id(), "room actor started");

        while let Some(cmd) = self.receiver.recv().await {
            tracing::trace!(room_id = %self.room.id(), ?cmd, "room command");
            match cmd {
                RoomCommand::Join {
                    id,
                    secret,
                    display_name,
                    reply,
                } => {
                    let result = self.room.join(id, secret, display_name).map(|()| JoinedRoom {
                        game_name: self.room.game_name().to_owned(),
                        presenter_id: self.room.presenter_id().to_owned(),
                    });
                    let _ = reply.send(result);
                }
                RoomCommand::Reactivate {
                    game_name,
                    presenter_id,
                    secret,
                    reply,
                } => {
                    let _ = reply.send(self.room.reactivate(&game_name, &presenter_id, &secret));
                }
                RoomCommand::SetSocket {
                    id,
                    secret,
                    socket,
                    reply,
                } => {
                    let _ = reply.send(self.room.set_socket(&id, &secret, socket));
                }
                RoomCommand::RemoveSocket { id, connection } => {
                    self.room.remove_socket(&id, connection);
                }
                RoomCommand::Receive {
                    sender_id,
                    frame,
                    reply,
                } => {
                    let _ = reply.send(self.room.receive_message(&sender_id, &frame));
                }
                RoomCommand::Forward { receiver_id, frame } => {
                    self.room.forward(&receiver_id, frame);
                }
                RoomCommand::Terminate {
                    presenter_secret,
                    reply,
                } => {
                    let _ = reply.send(self.room.terminate(&presenter_secret));
                }
                RoomCommand::GetInfo { reply } => {
                    let _ = reply.send(self.room.info());
                }
                RoomCommand::RetireIfInactive { reply } => {
                    let retire = !self.room.is_active(Instant::now());
                    let _ = reply.send(retire);
                    if retire {
                        tracing::info!(room_id = %self.room.id(), "inactive room retiring");
                        break;
                    }
                }
                RoomCommand::Shutdown => {
                    tracing::info!(room_id = %self.room.id(), "room shutting down");
                    break;
                }
            }
        }

        self.room.close_all(CloseCode::Normal);
        tracing::info!(room_id = %self.room.id(), "room actor stopped");
    }
}

/// Spawns a new room actor task and returns a handle to communicate with it.
///
/// `config.command_channel_size` controls backpressure: if the channel
/// fills up, senders wait.
pub(crate) fn spawn_room(
    room_id: String,
    game_name: String,
    presenter_id: String,
    presenter_secret: Secret,
    config: &RoomConfig,
    reporter: Reporter,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.command_channel_size.max(1));

    let room = Room::new(
        room_id.clone(),
        game_name,
        presenter_id,
        presenter_secret,
        config.inactivity_window,
        reporter,
    );
    let actor = RoomActor { room, receiver: rx };

    tokio::spawn(actor.run());

    RoomHandle { room_id, sender: tx }
}
