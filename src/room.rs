//! Room actor
//!
//! Each room runs its own control loop which owns the membership map.
//! Adding and removing members, fan-out and lookups all arrive as commands
//! on one bounded queue and are applied strictly in order.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::RoomError;
use crate::message::Message;
use crate::recipient::RecipientRef;
use crate::types::{ClientId, RoomName};

/// The part of the registry a room may talk to
///
/// Implementations must not block the calling room loop.
pub trait RoomRemover: Send + Sync + 'static {
    /// Ask for `room` to be removed because it has become empty
    fn request_removal(&self, room: RoomName);
}

/// Commands processed by a room's control loop
#[derive(Debug)]
pub enum RoomCommand {
    AddClient(RecipientRef),
    RemoveClient(ClientId),
    SendToEveryone(Message),
    FindClient {
        client_id: ClientId,
        reply: oneshot::Sender<Option<RecipientRef>>,
    },
    /// Stop the room if it is still empty. Replies whether it stopped.
    Retire { reply: oneshot::Sender<bool> },
}

/// Handle to a running room
#[derive(Debug, Clone)]
pub struct RoomHandle {
    name: RoomName,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn name(&self) -> &RoomName {
        &self.name
    }

    pub fn is_main(&self) -> bool {
        self.name.is_main()
    }

    pub async fn add_client(&self, client: RecipientRef) -> Result<(), RoomError> {
        self.command(RoomCommand::AddClient(client)).await
    }

    pub async fn remove_client(&self, client_id: ClientId) -> Result<(), RoomError> {
        self.command(RoomCommand::RemoveClient(client_id)).await
    }

    pub async fn send_to_everyone(&self, msg: Message) -> Result<(), RoomError> {
        self.command(RoomCommand::SendToEveryone(msg)).await
    }

    /// Look up a member by id
    ///
    /// Not-found is an explicit `ClientNotFound` error.
    pub async fn find_client(&self, client_id: &ClientId) -> Result<RecipientRef, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.command(RoomCommand::FindClient {
            client_id: client_id.clone(),
            reply,
        })
        .await?;

        rx.await
            .map_err(|_| RoomError::Closed)?
            .ok_or_else(|| RoomError::ClientNotFound(client_id.clone()))
    }

    /// Stop the room if it has no members
    ///
    /// Returns `true` when the room stopped.
    pub async fn retire(&self) -> Result<bool, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.command(RoomCommand::Retire { reply }).await?;
        rx.await.map_err(|_| RoomError::Closed)
    }

    async fn command(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.sender.send(cmd).await.map_err(|_| RoomError::Closed)
    }
}

/// Room state, owned by its control loop
pub struct Room {
    name: RoomName,
    members: HashMap<ClientId, RecipientRef>,
    /// `None` for the main room, which is never removed
    remover: Option<Box<dyn RoomRemover>>,
    /// Set once a removal request is outstanding
    removal_requested: bool,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl Room {
    /// Spawn a removable room
    pub fn start(name: RoomName, remover: impl RoomRemover, capacity: usize) -> RoomHandle {
        Self::spawn(name, Some(Box::new(remover)), capacity)
    }

    /// Spawn the main room. It stays alive while empty.
    pub fn start_main(capacity: usize) -> RoomHandle {
        Self::spawn(RoomName::main(), None, capacity)
    }

    fn spawn(
        name: RoomName,
        remover: Option<Box<dyn RoomRemover>>,
        capacity: usize,
    ) -> RoomHandle {
        let (sender, receiver) = mpsc::channel(capacity);
        let room = Room {
            name: name.clone(),
            members: HashMap::new(),
            remover,
            removal_requested: false,
            receiver,
        };
        tokio::spawn(room.run());
        RoomHandle { name, sender }
    }

    /// Run the room event loop
    ///
    /// Ends when every handle is dropped or the room is retired.
    async fn run(mut self) {
        info!("Room '{}' started", self.name);

        while let Some(cmd) = self.receiver.recv().await {
            if !self.handle_command(cmd) {
                break;
            }
        }

        info!("Room '{}' stopped", self.name);
    }

    /// Apply one command. Returns `false` when the loop should stop.
    fn handle_command(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::AddClient(client) => {
                debug!("Room '{}': adding client {}", self.name, client.id());
                self.members.insert(client.id().clone(), client);
                self.removal_requested = false;
            }
            RoomCommand::RemoveClient(client_id) => {
                if self.members.remove(&client_id).is_some() {
                    debug!("Room '{}': removed client {}", self.name, client_id);
                    self.request_removal_if_empty();
                }
            }
            RoomCommand::SendToEveryone(msg) => self.send_to_everyone(msg),
            RoomCommand::FindClient { client_id, reply } => {
                let _ = reply.send(self.members.get(&client_id).cloned());
            }
            RoomCommand::Retire { reply } => {
                let retire = self.members.is_empty() && self.remover.is_some();
                let _ = reply.send(retire);
                if retire {
                    return false;
                }
                self.removal_requested = false;
            }
        }
        true
    }

    fn send_to_everyone(&self, msg: Message) {
        debug!(
            "Room '{}': sending {} to {} members",
            self.name,
            msg.msg_type,
            self.members.len()
        );
        for member in self.members.values() {
            if let Err(e) = member.send(msg.clone()) {
                warn!(
                    "Room '{}': could not deliver to {}: {}",
                    self.name,
                    member.id(),
                    e
                );
            }
        }
    }

    fn request_removal_if_empty(&mut self) {
        if !self.members.is_empty() || self.removal_requested {
            return;
        }
        if let Some(remover) = &self.remover {
            info!("Room '{}' is empty, requesting removal", self.name);
            self.removal_requested = true;
            remover.request_removal(self.name.clone());
        }
    }
}
