//! Error types for the broker
//!
//! Transport failures end the owning client, room errors are reported back
//! to the requester as ERROR messages, send errors are logged per recipient.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::types::ClientId;

/// Transport errors raised by a `Connection`
///
/// Never retried. The owning client shuts down when it sees one.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The peer ended the stream
    #[error("Connection closed")]
    Closed,
}

/// Message delivery errors
///
/// Occurs when a client's outbound queue cannot take another message.
#[derive(Debug, Error)]
pub enum SendError {
    /// The outbound queue is at capacity
    #[error("Outbound queue full")]
    QueueFull,

    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}

/// Room and registry errors
#[derive(Debug, Error)]
pub enum RoomError {
    /// Room name is empty or contains forbidden characters
    #[error("Invalid room name: '{0}'")]
    InvalidName(String),

    /// Room not found with the given name
    #[error("Room '{0}' not found")]
    NotFound(String),

    /// Client is not a member of the room
    #[error("Client {0} not found")]
    ClientNotFound(ClientId),

    /// The actor owning the state has stopped
    #[error("Room actor stopped")]
    Closed,
}

/// Application-level errors
///
/// Returned by connection handling and inbound message handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error(transparent)]
    Send(#[from] SendError),
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        AppError::Connection(err.into())
    }
}
