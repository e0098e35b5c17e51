//! Basic type definitions for the broker
//!
//! Provides newtype wrappers for type safety:
//! - `ClientId`: stable client identifier (UUID v4 when generated locally)
//! - `RoomName`: validated room name
//! - `Identity`: the authenticated id + display name of a connection

use std::borrow::Borrow;
use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::error::RoomError;

/// Name of the room every client joins on connect. It is never removed.
pub const MAIN_ROOM: &str = "main";

/// Sender id and name stamped on broker-originated messages.
pub const SYSTEM_SENDER: &str = "system";

static ROOM_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_.-]*$").unwrap());

/// Unique client identifier (newtype pattern)
///
/// Ids are supplied by the identity layer at connect time and travel on the
/// wire as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// Create a new random client ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room name
///
/// User-created names must be non-empty and consist of ASCII letters, digits,
/// `_`, `.` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomName(String);

impl RoomName {
    /// Validate a requested room name
    pub fn parse(name: &str) -> Result<Self, RoomError> {
        if name.is_empty() || !ROOM_NAME_PATTERN.is_match(name) {
            return Err(RoomError::InvalidName(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    /// The name of the main room
    pub fn main() -> Self {
        Self(MAIN_ROOM.to_string())
    }

    pub fn is_main(&self) -> bool {
        self.0 == MAIN_ROOM
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for RoomName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated identity of a connection, immutable for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: ClientId,
    pub name: String,
}

impl Identity {
    pub fn new(id: ClientId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
