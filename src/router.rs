//! Inbound message routing
//!
//! A `Router` is built once per client when it starts and maps each message
//! type to the handler that acts on it. Types without a route are dropped
//! by the caller.

use std::collections::HashMap;

use futures_util::future::BoxFuture;

use crate::error::AppError;
use crate::message::{Message, MessageType};
use crate::recipient::{RecipientRef, StopRef};
use crate::rooms::Rooms;

pub trait Handler: Send + Sync {
    fn handle(&self, msg: Message) -> BoxFuture<'_, Result<(), AppError>>;
}

#[derive(Default)]
pub struct Router {
    routes: HashMap<MessageType, Box<dyn Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routing table for one client
    ///
    /// `client` is the client's own sender capability, `stop` ends it.
    pub fn for_client(rooms: &Rooms, client: RecipientRef, stop: StopRef) -> Self {
        let mut router = Self::new();
        router.register(
            MessageType::UserJoinedRoom,
            JoinRoom {
                rooms: rooms.clone(),
                client: client.clone(),
            },
        );
        router.register(
            MessageType::Text,
            SendToRoom {
                rooms: rooms.clone(),
            },
        );
        router.register(
            MessageType::CreateRoom,
            CreateRoom {
                rooms: rooms.clone(),
                client: client.clone(),
            },
        );
        router.register(
            MessageType::UserLeftRoom,
            LeaveRoom {
                rooms: rooms.clone(),
                client: client.clone(),
            },
        );
        router.register(MessageType::Logout, EchoToSelf { client, stop });
        router
    }

    pub fn register(&mut self, msg_type: MessageType, handler: impl Handler + 'static) {
        self.routes.insert(msg_type, Box::new(handler));
    }

    pub fn find_route(&self, msg_type: &MessageType) -> Option<&dyn Handler> {
        self.routes.get(msg_type).map(|handler| handler.as_ref())
    }

    /// Registered message types
    #[cfg(test)]
    pub(crate) fn message_types(&self) -> impl Iterator<Item = &MessageType> {
        self.routes.keys()
    }
}

struct JoinRoom {
    rooms: Rooms,
    client: RecipientRef,
}

impl Handler for JoinRoom {
    fn handle(&self, msg: Message) -> BoxFuture<'_, Result<(), AppError>> {
        Box::pin(async move {
            self.rooms
                .add_client_to_room(msg.room_name(), self.client.clone())
                .await?;
            Ok(())
        })
    }
}

struct SendToRoom {
    rooms: Rooms,
}

impl Handler for SendToRoom {
    fn handle(&self, msg: Message) -> BoxFuture<'_, Result<(), AppError>> {
        Box::pin(async move {
            self.rooms.send_message_on_room(msg).await?;
            Ok(())
        })
    }
}

struct CreateRoom {
    rooms: Rooms,
    client: RecipientRef,
}

impl Handler for CreateRoom {
    fn handle(&self, msg: Message) -> BoxFuture<'_, Result<(), AppError>> {
        Box::pin(async move {
            self.rooms
                .create_room(msg.room_name(), self.client.clone())
                .await?;
            Ok(())
        })
    }
}

struct LeaveRoom {
    rooms: Rooms,
    client: RecipientRef,
}

impl Handler for LeaveRoom {
    fn handle(&self, msg: Message) -> BoxFuture<'_, Result<(), AppError>> {
        Box::pin(async move {
            self.rooms
                .remove_client_from_room(msg.room_name(), self.client.clone())
                .await?;
            Ok(())
        })
    }
}

/// Sends the message back through the client's own outbound queue
///
/// The echoed LOGOUT is what ends the send task. If it cannot be queued the
/// client is stopped directly instead.
struct EchoToSelf {
    client: RecipientRef,
    stop: StopRef,
}

impl Handler for EchoToSelf {
    fn handle(&self, msg: Message) -> BoxFuture<'_, Result<(), AppError>> {
        Box::pin(async move {
            if let Err(e) = self.client.send(msg) {
                self.stop.stop();
                return Err(e.into());
            }
            Ok(())
        })
    }
}
