//! The `transport` module is the seam between the connection manager and a
//! concrete broker.
//!
//! `BrokerConnector` opens links; a `BrokerLink` carries the four wire
//! operations the publisher needs (AUTH, SELECT, PING, PUBLISH). The Redis
//! implementation lives in `redis_link`; `crate::broker` provides an
//! in-process one.

pub mod redis_link;

use async_trait::async_trait;

use crate::utils::TransportError;

pub use redis_link::RedisConnector;

/// One open connection to a broker.
#[async_trait]
pub trait BrokerLink: Send {
    async fn auth(&mut self, password: &str) -> Result<(), TransportError>;

    async fn select(&mut self, database: i64) -> Result<(), TransportError>;

    /// Liveness probe. `Ok` means the link can be reused as is.
    async fn ping(&mut self) -> Result<(), TransportError>;

    /// Publishes `payload` on `channel`, returning the number of receivers
    /// the broker reports.
    async fn publish(&mut self, channel: &str, payload: &str) -> Result<i64, TransportError>;
}

/// Opens links to a broker. Each call makes a single attempt; retrying is
/// the connection manager's job.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn BrokerLink>, TransportError>;
}
