//! Sender capability
//!
//! Rooms and the registry reach clients only through this narrow interface,
//! so neither module depends on `Client` itself.

use std::fmt;
use std::sync::Arc;

use crate::error::SendError;
use crate::message::Message;
use crate::types::ClientId;

pub type RecipientRef = Arc<dyn Recipient>;

/// Something that can be addressed by id and handed messages
pub trait Recipient: fmt::Debug + Send + Sync {
    fn id(&self) -> &ClientId;

    /// Enqueue a message for delivery
    ///
    /// Must return immediately. A full or closed queue is reported as an error,
    /// never waited on.
    fn send(&self, msg: Message) -> Result<(), SendError>;
}

pub type StopRef = Arc<dyn Stop>;

/// Ends the client behind a handle
pub trait Stop: Send + Sync {
    /// Request shutdown. Repeated calls are harmless.
    fn stop(&self);
}
