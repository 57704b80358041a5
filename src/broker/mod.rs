//! An in-process pub/sub broker speaking the `transport` seam.
//!
//! It stands in for Redis wherever a real server is unavailable: channel
//! subscribers receive what the publisher sends, and faults (unreachable
//! host, rejected password, dropped connections, failing publishes) can be
//! switched on to drive the publisher through its failure paths.

pub mod channel;
pub mod engine;
pub mod message;

pub use engine::{ConnectAttempt, MemoryBroker, MemoryConnector, SharedBroker};
pub use message::BrokerMessage;
