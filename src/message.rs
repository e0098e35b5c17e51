//! Message protocol definitions
//!
//! A single JSON frame shape is used in both directions. The `msgType` tag
//! selects which of the optional payload fields are meaningful.
//!
//! ```json
//! { "msgType": "TEXT_MSG", "senderId": "..", "senderName": "..",
//!   "room": "golang", "content": "hi" }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::RoomError;
use crate::types::{ClientId, RoomName, SYSTEM_SENDER};

/// Message type tag
///
/// Tags this broker does not know are kept as `Unknown` so that newer
/// clients can talk to an older broker without being disconnected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    UserJoinedRoom,
    UserLeftRoom,
    Logout,
    Text,
    CreateRoom,
    RemoveRoom,
    RoomsList,
    Error,
    Unknown(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::UserJoinedRoom => "USER_JOINED_ROOM",
            MessageType::UserLeftRoom => "USER_LEFT_ROOM",
            MessageType::Logout => "LOGOUT_USER",
            MessageType::Text => "TEXT_MSG",
            MessageType::CreateRoom => "CREATE_ROOM",
            MessageType::RemoveRoom => "REMOVE_ROOM",
            MessageType::RoomsList => "ROOMS_LIST",
            MessageType::Error => "ERROR",
            MessageType::Unknown(tag) => tag,
        }
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "USER_JOINED_ROOM" => MessageType::UserJoinedRoom,
            "USER_LEFT_ROOM" => MessageType::UserLeftRoom,
            "LOGOUT_USER" => MessageType::Logout,
            "TEXT_MSG" => MessageType::Text,
            "CREATE_ROOM" => MessageType::CreateRoom,
            "REMOVE_ROOM" => MessageType::RemoveRoom,
            "ROOMS_LIST" => MessageType::RoomsList,
            "ERROR" => MessageType::Error,
            _ => MessageType::Unknown(tag),
        }
    }
}

impl From<MessageType> for String {
    fn from(msg_type: MessageType) -> Self {
        match msg_type {
            MessageType::Unknown(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broker message, inbound and outbound
///
/// `sender_id` and `sender_name` on inbound frames are overwritten by the
/// receiving client from its own identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub msg_type: MessageType,
    #[serde(default)]
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rooms: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Message {
    fn system(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            sender_id: SYSTEM_SENDER.to_string(),
            sender_name: SYSTEM_SENDER.to_string(),
            rooms: None,
            room: None,
            content: None,
        }
    }

    fn from_client(msg_type: MessageType, client_id: &ClientId, room: &str) -> Self {
        Self {
            msg_type,
            sender_id: client_id.to_string(),
            sender_name: client_id.to_string(),
            rooms: None,
            room: Some(room.to_string()),
            content: None,
        }
    }

    /// Announces a newly created room
    pub fn create_room(room: &RoomName) -> Self {
        Self {
            room: Some(room.to_string()),
            ..Self::system(MessageType::CreateRoom)
        }
    }

    /// Announces a removed room
    pub fn remove_room(room: &RoomName) -> Self {
        Self {
            room: Some(room.to_string()),
            ..Self::system(MessageType::RemoveRoom)
        }
    }

    /// Listing of room names
    pub fn rooms_list(names: Vec<String>) -> Self {
        Self {
            rooms: Some(names),
            ..Self::system(MessageType::RoomsList)
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::system(MessageType::Error)
        }
    }

    /// Chat text addressed to `room`, sender fields left for the client to stamp
    pub fn text(room: &str, content: impl Into<String>) -> Self {
        Self {
            msg_type: MessageType::Text,
            sender_id: String::new(),
            sender_name: String::new(),
            rooms: None,
            room: Some(room.to_string()),
            content: Some(content.into()),
        }
    }

    /// Confirms to a client that it joined `room`
    pub fn user_joined_room(room: &str, client_id: &ClientId) -> Self {
        Self::from_client(MessageType::UserJoinedRoom, client_id, room)
    }

    /// Confirms to a client that it left `room`
    pub fn user_left_room(room: &str, client_id: &ClientId) -> Self {
        Self::from_client(MessageType::UserLeftRoom, client_id, room)
    }

    /// Room field, empty when absent
    pub fn room_name(&self) -> &str {
        self.room.as_deref().unwrap_or_default()
    }
}

/// Convert RoomError to an ERROR message for the requesting client
impl From<&RoomError> for Message {
    fn from(err: &RoomError) -> Self {
        Message::error(err.to_string())
    }
}
