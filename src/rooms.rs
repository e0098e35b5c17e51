//! Rooms registry actor
//!
//! Owns the name → room directory. Room lifecycle (create, remove, lookup)
//! and every per-room request from clients go through one command queue and
//! are handled one at a time, so two concurrent creates of the same name
//! yield exactly one room.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::error::RoomError;
use crate::message::Message;
use crate::recipient::RecipientRef;
use crate::room::{Room, RoomHandle, RoomRemover};
use crate::types::{ClientId, RoomName, MAIN_ROOM};

/// Commands sent to the registry actor
#[derive(Debug)]
pub enum RoomsCommand {
    CreateRoom {
        name: String,
        requester: RecipientRef,
    },
    AddClientToRoom {
        name: String,
        client: RecipientRef,
    },
    RemoveClientFromRoom {
        name: String,
        client: RecipientRef,
    },
    /// Unconditional removal of a room
    RemoveRoom {
        name: String,
    },
    /// A room reported that its last member left
    RoomEmptied {
        name: RoomName,
    },
    /// Remove a client from every room
    RemoveClient {
        client_id: ClientId,
    },
    SendMessageOnRoom {
        message: Message,
    },
    ClientsRooms {
        client_id: ClientId,
        reply: oneshot::Sender<Vec<String>>,
    },
    RoomNames {
        reply: oneshot::Sender<Vec<String>>,
    },
}

/// Handle to the registry actor
///
/// Cheap to clone. The registry stops once every handle is dropped.
#[derive(Debug, Clone)]
pub struct Rooms {
    sender: mpsc::Sender<RoomsCommand>,
}

impl Rooms {
    /// Spawn the registry together with the main room
    pub fn start(config: &BrokerConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.registry_queue_capacity);
        let registry = Registry::new(receiver, sender.downgrade(), config);
        tokio::spawn(registry.run());
        Self { sender }
    }

    /// Create a room and make the requester its first member
    ///
    /// Creating a room that already exists is a no-op.
    pub async fn create_room(
        &self,
        name: impl Into<String>,
        requester: RecipientRef,
    ) -> Result<(), RoomError> {
        self.command(RoomsCommand::CreateRoom {
            name: name.into(),
            requester,
        })
        .await
    }

    pub async fn add_client_to_room(
        &self,
        name: impl Into<String>,
        client: RecipientRef,
    ) -> Result<(), RoomError> {
        self.command(RoomsCommand::AddClientToRoom {
            name: name.into(),
            client,
        })
        .await
    }

    pub async fn remove_client_from_room(
        &self,
        name: impl Into<String>,
        client: RecipientRef,
    ) -> Result<(), RoomError> {
        self.command(RoomsCommand::RemoveClientFromRoom {
            name: name.into(),
            client,
        })
        .await
    }

    /// Remove a room. The main room is never removed.
    pub async fn remove_room(&self, name: impl Into<String>) -> Result<(), RoomError> {
        self.command(RoomsCommand::RemoveRoom { name: name.into() })
            .await
    }

    /// Remove a client from every room it belongs to
    pub async fn remove_client(&self, client_id: ClientId) -> Result<(), RoomError> {
        self.command(RoomsCommand::RemoveClient { client_id }).await
    }

    /// Broadcast a message to the room named in `message.room`
    pub async fn send_message_on_room(&self, message: Message) -> Result<(), RoomError> {
        self.command(RoomsCommand::SendMessageOnRoom { message })
            .await
    }

    /// Names of the rooms the client currently belongs to, sorted
    pub async fn clients_rooms(&self, client_id: &ClientId) -> Result<Vec<String>, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.command(RoomsCommand::ClientsRooms {
            client_id: client_id.clone(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| RoomError::Closed)
    }

    /// Names of all existing rooms, sorted
    pub async fn room_names(&self) -> Result<Vec<String>, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.command(RoomsCommand::RoomNames { reply }).await?;
        rx.await.map_err(|_| RoomError::Closed)
    }

    async fn command(&self, cmd: RoomsCommand) -> Result<(), RoomError> {
        self.sender.send(cmd).await.map_err(|_| RoomError::Closed)
    }
}

/// Removal capability handed to each non-main room
///
/// Holds a weak sender so rooms do not keep the registry alive.
struct RegistryRemover {
    sender: mpsc::WeakSender<RoomsCommand>,
}

impl RoomRemover for RegistryRemover {
    fn request_removal(&self, room: RoomName) {
        let Some(sender) = self.sender.upgrade() else {
            debug!("Registry gone, dropping removal request for '{}'", room);
            return;
        };
        // The registry may itself be waiting on this room's queue
        tokio::spawn(async move {
            let name = room.to_string();
            if sender.send(RoomsCommand::RoomEmptied { name: room }).await.is_err() {
                debug!("Registry stopped, dropping removal request for '{}'", name);
            }
        });
    }
}

/// Registry state, owned by its control loop
struct Registry {
    rooms: HashMap<RoomName, RoomHandle>,
    receiver: mpsc::Receiver<RoomsCommand>,
    /// Used to build removal capabilities for new rooms
    self_sender: mpsc::WeakSender<RoomsCommand>,
    room_queue_capacity: usize,
}

impl Registry {
    fn new(
        receiver: mpsc::Receiver<RoomsCommand>,
        self_sender: mpsc::WeakSender<RoomsCommand>,
        config: &BrokerConfig,
    ) -> Self {
        let mut rooms = HashMap::new();
        rooms.insert(
            RoomName::main(),
            Room::start_main(config.room_queue_capacity),
        );
        Self {
            rooms,
            receiver,
            self_sender,
            room_queue_capacity: config.room_queue_capacity,
        }
    }

    /// Run the registry event loop
    ///
    /// Continuously receives and processes commands until all handles are dropped.
    async fn run(mut self) {
        info!("Rooms registry started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("Rooms registry shutting down");
    }

    /// Process a single command
    async fn handle_command(&mut self, cmd: RoomsCommand) {
        match cmd {
            RoomsCommand::CreateRoom { name, requester } => {
                self.handle_create_room(name, requester).await;
            }
            RoomsCommand::AddClientToRoom { name, client } => {
                self.handle_add_client_to_room(name, client).await;
            }
            RoomsCommand::RemoveClientFromRoom { name, client } => {
                self.handle_remove_client_from_room(name, client).await;
            }
            RoomsCommand::RemoveRoom { name } => {
                self.handle_remove_room(name).await;
            }
            RoomsCommand::RoomEmptied { name } => {
                self.handle_room_emptied(name).await;
            }
            RoomsCommand::RemoveClient { client_id } => {
                self.handle_remove_client(client_id).await;
            }
            RoomsCommand::SendMessageOnRoom { message } => {
                let name = message.room_name().to_string();
                self.send_to_room(&name, message).await;
            }
            RoomsCommand::ClientsRooms { client_id, reply } => {
                let names = self.clients_rooms(&client_id).await;
                let _ = reply.send(names);
            }
            RoomsCommand::RoomNames { reply } => {
                let _ = reply.send(self.names());
            }
        }
    }

    /// Handle room creation
    async fn handle_create_room(&mut self, name: String, requester: RecipientRef) {
        info!("Create room request from {}. Room name: '{}'", requester.id(), name);

        let name = match RoomName::parse(&name) {
            Ok(name) => name,
            Err(err) => {
                info!("Rejecting create request from {}: {}", requester.id(), err);
                deliver(&requester, Message::from(&err));
                return;
            }
        };

        if self.rooms.contains_key(&name) {
            info!(
                "Room '{}' already exists, {} cannot create it",
                name,
                requester.id()
            );
            return;
        }

        let remover = RegistryRemover {
            sender: self.self_sender.clone(),
        };
        let room = Room::start(name.clone(), remover, self.room_queue_capacity);
        if let Err(e) = room.add_client(requester.clone()).await {
            warn!("Room '{}' failed to start: {}", name, e);
            return;
        }
        self.rooms.insert(name.clone(), room);

        info!("Room '{}' created by {}", name, requester.id());

        self.send_to_room(MAIN_ROOM, Message::create_room(&name)).await;
        deliver(
            &requester,
            Message::user_joined_room(name.as_str(), requester.id()),
        );
    }

    /// Handle room joining
    async fn handle_add_client_to_room(&mut self, name: String, client: RecipientRef) {
        let Some(room) = self.rooms.get(name.as_str()) else {
            info!("Client {} cannot join missing room '{}'", client.id(), name);
            deliver(&client, Message::from(&RoomError::NotFound(name)));
            return;
        };

        if let Err(e) = room.add_client(client.clone()).await {
            warn!("Cannot add {} to room '{}': {}", client.id(), name, e);
            return;
        }

        info!("Client {} joined room '{}'", client.id(), name);

        if room.is_main() {
            deliver(&client, Message::rooms_list(self.names()));
        }
        deliver(&client, Message::user_joined_room(&name, client.id()));
    }

    /// Handle voluntary room leaving
    async fn handle_remove_client_from_room(&mut self, name: String, client: RecipientRef) {
        let Some(room) = self.rooms.get(name.as_str()) else {
            info!("Client {} cannot leave missing room '{}'", client.id(), name);
            deliver(&client, Message::from(&RoomError::NotFound(name)));
            return;
        };

        info!("Remove client {} from room '{}'", client.id(), name);

        if let Err(e) = room.remove_client(client.id().clone()).await {
            warn!("Cannot remove {} from room '{}': {}", client.id(), name, e);
            return;
        }
        deliver(&client, Message::user_left_room(&name, client.id()));
    }

    async fn handle_remove_room(&mut self, name: String) {
        if name == MAIN_ROOM {
            info!("Cannot remove '{}' room", MAIN_ROOM);
            return;
        }

        let Some((name, _room)) = self.rooms.remove_entry(name.as_str()) else {
            debug!("Room '{}' already removed", name);
            return;
        };
        // Dropping the handle stops the room once its queue drains
        self.announce_removal(&name).await;
    }

    async fn handle_room_emptied(&mut self, name: RoomName) {
        let Some(room) = self.rooms.get(&name) else {
            debug!("Room '{}' already removed", name);
            return;
        };

        let retired = room.retire().await;
        match retired {
            Ok(true) | Err(_) => {
                self.rooms.remove(&name);
                self.announce_removal(&name).await;
            }
            Ok(false) => {
                debug!("Room '{}' gained members again, keeping it", name);
            }
        }
    }

    async fn announce_removal(&mut self, name: &RoomName) {
        info!("Room '{}' removed", name);
        self.send_to_room(MAIN_ROOM, Message::remove_room(name)).await;
    }

    /// Handle client disconnection
    async fn handle_remove_client(&mut self, client_id: ClientId) {
        info!("Removing client {} from all rooms", client_id);
        for room in self.rooms.values() {
            if let Err(e) = room.remove_client(client_id.clone()).await {
                warn!("Cannot remove {} from room '{}': {}", client_id, room.name(), e);
            }
        }
    }

    /// Helper: forward a broadcast to a room, dropping it if the room is gone
    async fn send_to_room(&self, name: &str, msg: Message) {
        let Some(room) = self.rooms.get(name) else {
            info!("Cannot send {} because room '{}' doesn't exist", msg.msg_type, name);
            return;
        };

        debug!("Send {} to room '{}'", msg.msg_type, name);
        if let Err(e) = room.send_to_everyone(msg).await {
            warn!("Cannot send to room '{}': {}", name, e);
        }
    }

    async fn clients_rooms(&self, client_id: &ClientId) -> Vec<String> {
        let mut names = Vec::new();
        for room in self.rooms.values() {
            if room.find_client(client_id).await.is_ok() {
                names.push(room.name().to_string());
            }
        }
        names.sort();
        names
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rooms.keys().map(|name| name.to_string()).collect();
        names.sort();
        names
    }
}

/// Helper: hand a reply to one client, logging if it cannot take it
fn deliver(client: &RecipientRef, msg: Message) {
    let msg_type = msg.msg_type.clone();
    if let Err(e) = client.send(msg) {
        warn!("Cannot deliver {} to {}: {}", msg_type, client.id(), e);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::message::MessageType;
    use crate::recipient::testing::{assert_idle, next, recipient};

    fn start() -> Rooms {
        Rooms::start(&BrokerConfig::default())
    }

    /// Poll until the registry reports the expected room names
    async fn wait_for_names(rooms: &Rooms, expected: &[&str]) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        loop {
            let names = rooms.room_names().await.unwrap();
            if names == expected {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "room names stuck at {:?}, expected {:?}",
                names,
                expected
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_main_room_exists_from_start() {
        let rooms = start();
        assert_eq!(rooms.room_names().await.unwrap(), vec!["main"]);
    }

    #[tokio::test]
    async fn test_joining_main_sends_listing_then_confirmation() {
        let rooms = start();
        let (client, mut rx) = recipient("c1", 8);

        rooms.add_client_to_room(MAIN_ROOM, client).await.unwrap();

        let listing = next(&mut rx).await;
        assert_eq!(listing.msg_type, MessageType::RoomsList);
        assert_eq!(listing.rooms, Some(vec!["main".to_string()]));

        let joined = next(&mut rx).await;
        assert_eq!(joined.msg_type, MessageType::UserJoinedRoom);
        assert_eq!(joined.room_name(), MAIN_ROOM);
        assert_eq!(joined.sender_id, "c1");
    }

    #[tokio::test]
    async fn test_create_then_join_is_observable() {
        let rooms = start();
        let (creator, mut creator_rx) = recipient("c1", 8);
        let (joiner, mut joiner_rx) = recipient("c2", 8);

        for name in ["golang", "a.b-c_d", "X9"] {
            rooms.create_room(name, creator.clone()).await.unwrap();
            let joined = next(&mut creator_rx).await;
            assert_eq!(joined.msg_type, MessageType::UserJoinedRoom);
            assert_eq!(joined.room_name(), name);

            rooms.add_client_to_room(name, joiner.clone()).await.unwrap();
            let joined = next(&mut joiner_rx).await;
            assert_eq!(joined.msg_type, MessageType::UserJoinedRoom);
            assert_eq!(joined.room_name(), name);
        }

        let c2_rooms = rooms.clients_rooms(&ClientId::from("c2")).await.unwrap();
        assert_eq!(c2_rooms, vec!["X9", "a.b-c_d", "golang"]);
        assert_eq!(
            rooms.room_names().await.unwrap(),
            vec!["X9", "a.b-c_d", "golang", "main"]
        );
    }

    #[tokio::test]
    async fn test_create_broadcasts_to_main() {
        let rooms = start();
        let (watcher, mut watcher_rx) = recipient("watcher", 8);
        let (creator, _creator_rx) = recipient("c1", 8);
        rooms.add_client_to_room(MAIN_ROOM, watcher).await.unwrap();
        next(&mut watcher_rx).await;
        next(&mut watcher_rx).await;

        rooms.create_room("golang", creator).await.unwrap();

        let created = next(&mut watcher_rx).await;
        assert_eq!(created.msg_type, MessageType::CreateRoom);
        assert_eq!(created.room_name(), "golang");
        assert_eq!(created.sender_id, "system");
    }

    #[tokio::test]
    async fn test_concurrent_creates_yield_one_room() {
        let rooms = start();
        let (first, first_rx) = recipient("c1", 8);
        let (second, second_rx) = recipient("c2", 8);

        let (a, b) = tokio::join!(
            rooms.create_room("golang", first),
            rooms.create_room("golang", second)
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(rooms.room_names().await.unwrap(), vec!["golang", "main"]);

        // Exactly one requester was joined; the other got nothing
        let c1 = rooms.clients_rooms(&ClientId::from("c1")).await.unwrap();
        let c2 = rooms.clients_rooms(&ClientId::from("c2")).await.unwrap();
        assert_eq!(c1.len() + c2.len(), 1);
        let (mut winner, mut loser) = if c1.len() == 1 {
            (first_rx, second_rx)
        } else {
            (second_rx, first_rx)
        };
        assert_eq!(next(&mut winner).await.msg_type, MessageType::UserJoinedRoom);
        assert_idle(&mut loser).await;
    }

    #[tokio::test]
    async fn test_invalid_name_replies_error() {
        let rooms = start();
        let (client, mut rx) = recipient("c1", 8);

        rooms.create_room("bad name!", client.clone()).await.unwrap();
        rooms.create_room("", client).await.unwrap();

        for _ in 0..2 {
            let err = next(&mut rx).await;
            assert_eq!(err.msg_type, MessageType::Error);
        }
        assert_eq!(rooms.room_names().await.unwrap(), vec!["main"]);
    }

    #[tokio::test]
    async fn test_join_or_leave_missing_room_replies_error() {
        let rooms = start();
        let (client, mut rx) = recipient("c1", 8);

        rooms.add_client_to_room("nowhere", client.clone()).await.unwrap();
        rooms.remove_client_from_room("nowhere", client).await.unwrap();

        for _ in 0..2 {
            let err = next(&mut rx).await;
            assert_eq!(err.msg_type, MessageType::Error);
            assert_eq!(err.content.as_deref(), Some("Room 'nowhere' not found"));
        }
        assert_eq!(rooms.room_names().await.unwrap(), vec!["main"]);
    }

    #[tokio::test]
    async fn test_main_room_cannot_be_removed() {
        let rooms = start();
        let (watcher, mut rx) = recipient("watcher", 8);
        rooms.add_client_to_room(MAIN_ROOM, watcher).await.unwrap();
        next(&mut rx).await;
        next(&mut rx).await;

        rooms.remove_room(MAIN_ROOM).await.unwrap();

        assert_eq!(rooms.room_names().await.unwrap(), vec!["main"]);
        assert_idle(&mut rx).await;
    }

    #[tokio::test]
    async fn test_explicit_remove_room() {
        let rooms = start();
        let (watcher, mut watcher_rx) = recipient("watcher", 8);
        let (creator, _creator_rx) = recipient("c1", 8);
        rooms.add_client_to_room(MAIN_ROOM, watcher).await.unwrap();
        next(&mut watcher_rx).await;
        next(&mut watcher_rx).await;
        rooms.create_room("golang", creator).await.unwrap();
        next(&mut watcher_rx).await;

        rooms.remove_room("golang").await.unwrap();

        assert_eq!(rooms.room_names().await.unwrap(), vec!["main"]);
        let removed = next(&mut watcher_rx).await;
        assert_eq!(removed.msg_type, MessageType::RemoveRoom);
        assert_eq!(removed.room_name(), "golang");
    }

    #[tokio::test]
    async fn test_leaving_last_member_removes_room_once() {
        let rooms = start();
        let (watcher, mut watcher_rx) = recipient("watcher", 8);
        let (creator, mut creator_rx) = recipient("c1", 8);
        rooms.add_client_to_room(MAIN_ROOM, watcher).await.unwrap();
        next(&mut watcher_rx).await;
        next(&mut watcher_rx).await;
        rooms.create_room("golang", creator.clone()).await.unwrap();
        next(&mut watcher_rx).await;
        next(&mut creator_rx).await;

        rooms.remove_client_from_room("golang", creator).await.unwrap();
        let left = next(&mut creator_rx).await;
        assert_eq!(left.msg_type, MessageType::UserLeftRoom);

        wait_for_names(&rooms, &["main"]).await;
        let removed = next(&mut watcher_rx).await;
        assert_eq!(removed.msg_type, MessageType::RemoveRoom);
        assert_eq!(removed.room_name(), "golang");
        assert_idle(&mut watcher_rx).await;
    }

    #[tokio::test]
    async fn test_stale_emptied_report_keeps_repopulated_room() {
        let rooms = start();
        let (watcher, mut watcher_rx) = recipient("watcher", 8);
        let (creator, mut creator_rx) = recipient("c1", 8);
        let (joiner, mut joiner_rx) = recipient("c2", 8);
        rooms.add_client_to_room(MAIN_ROOM, watcher).await.unwrap();
        next(&mut watcher_rx).await;
        next(&mut watcher_rx).await;
        rooms.create_room("golang", creator).await.unwrap();
        next(&mut watcher_rx).await;
        next(&mut creator_rx).await;
        rooms.add_client_to_room("golang", joiner).await.unwrap();
        next(&mut joiner_rx).await;

        // Report arriving after the room gained a member again
        rooms
            .command(RoomsCommand::RoomEmptied {
                name: RoomName::parse("golang").unwrap(),
            })
            .await
            .unwrap();

        assert_eq!(rooms.room_names().await.unwrap(), vec!["golang", "main"]);
        assert_idle(&mut watcher_rx).await;

        rooms
            .send_message_on_room(Message::text("golang", "still here"))
            .await
            .unwrap();
        assert_eq!(next(&mut joiner_rx).await.content.as_deref(), Some("still here"));
    }

    #[tokio::test]
    async fn test_text_to_missing_room_is_dropped() {
        let rooms = start();
        let (client, mut rx) = recipient("c1", 8);
        rooms.add_client_to_room(MAIN_ROOM, client).await.unwrap();
        next(&mut rx).await;
        next(&mut rx).await;

        rooms
            .send_message_on_room(Message::text("nowhere", "hi"))
            .await
            .unwrap();

        assert_eq!(rooms.room_names().await.unwrap(), vec!["main"]);
        assert_idle(&mut rx).await;
    }

    #[tokio::test]
    async fn test_broadcasts_from_two_sources_keep_order() {
        let rooms = start();
        let (member, mut rx) = recipient("m", 64);
        rooms.create_room("golang", member).await.unwrap();
        next(&mut rx).await;

        let text = |n: usize| Message::text("golang", format!("{n}"));
        let source_a = rooms.clone();
        let source_b = rooms.clone();
        source_a.send_message_on_room(text(1)).await.unwrap();
        source_b.send_message_on_room(text(2)).await.unwrap();
        source_a.send_message_on_room(text(3)).await.unwrap();

        for n in 1..=3 {
            assert_eq!(next(&mut rx).await.content, Some(format!("{n}")));
        }
    }

    #[tokio::test]
    async fn test_slow_client_does_not_block_registry() {
        let rooms = start();
        // Outbound queue of 50 which nobody drains
        let (stalled, _stalled_rx) = recipient("slow", 50);
        rooms.create_room("golang", stalled).await.unwrap();

        for n in 0..60 {
            rooms
                .send_message_on_room(Message::text("golang", format!("{n}")))
                .await
                .unwrap();
        }

        let names = tokio::time::timeout(Duration::from_millis(500), rooms.room_names())
            .await
            .expect("registry loop blocked")
            .unwrap();
        assert_eq!(names, vec!["golang", "main"]);
    }
}
