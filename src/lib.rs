//! Multi-room WebSocket Broker Library
//!
//! A real-time message broker built with tokio-tungstenite using the Actor
//! pattern for state management.
//!
//! # Features
//! - Automatic join of the `main` room on connect
//! - Creating, joining and leaving named rooms
//! - Broadcasting text to a room's members
//! - Automatic removal of empty rooms (except `main`)
//! - Logout and disconnection handling
//!
//! # Architecture
//! Uses the Actor pattern with bounded `mpsc` channels:
//! - `Rooms` is the registry actor owning the room directory
//! - each `Room` is an actor owning its membership
//! - each `Client` runs a send task and a receive task over its `Connection`
//! - rooms reach clients only through the `Recipient` capability
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use chat_broker::{handle_connection, BrokerConfig, Rooms};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let config = BrokerConfig::default();
//!     let rooms = Rooms::start(&config);
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, rooms.clone(), config.clone()));
//!     }
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod message;
pub mod recipient;
pub mod room;
pub mod rooms;
pub mod router;
pub mod types;

// Re-export main types for convenience
pub use client::{Client, ClientHandle};
pub use config::BrokerConfig;
pub use connection::{Connection, WsConnection};
pub use error::{AppError, ConnectionError, RoomError, SendError};
pub use handler::handle_connection;
pub use message::{Message, MessageType};
pub use recipient::{Recipient, RecipientRef};
pub use room::{Room, RoomHandle};
pub use rooms::Rooms;
pub use router::Router;
pub use types::{ClientId, Identity, RoomName, MAIN_ROOM};
