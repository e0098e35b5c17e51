//! Broker configuration
//!
//! Queue capacities for the actors. The binary fills this in from the
//! command line; tests and embedders use `Default`.

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Default capacity of every bounded queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Outbound messages buffered per client before deliveries are dropped
    pub client_queue_capacity: usize,
    /// Pending commands per room
    pub room_queue_capacity: usize,
    /// Pending commands for the rooms registry
    pub registry_queue_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            client_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            room_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            registry_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}
