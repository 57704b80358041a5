use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use super::{BrokerConnector, BrokerLink};
use crate::utils::TransportError;

/// Connects to Redis over TCP.
///
/// Links are opened without a response timeout so an idle link stays usable
/// for the life of the process; liveness is checked with PING before reuse.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

pub struct RedisLink {
    conn: MultiplexedConnection,
}

fn redis_url(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("redis://[{host}]:{port}/")
    } else {
        format!("redis://{host}:{port}/")
    }
}

#[async_trait]
impl BrokerConnector for RedisConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn BrokerLink>, TransportError> {
        let client = redis::Client::open(redis_url(host, port).as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Box::new(RedisLink { conn }))
    }
}

#[async_trait]
impl BrokerLink for RedisLink {
    async fn auth(&mut self, password: &str) -> Result<(), TransportError> {
        redis::cmd("AUTH")
            .arg(password)
            .query_async::<()>(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn select(&mut self, database: i64) -> Result<(), TransportError> {
        redis::cmd("SELECT")
            .arg(database)
            .query_async::<()>(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        let reply: String = redis::cmd("PING").query_async(&mut self.conn).await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(TransportError::Rejected(format!("unexpected PING reply: {reply}")))
        }
    }

    async fn publish(&mut self, channel: &str, payload: &str) -> Result<i64, TransportError> {
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut self.conn)
            .await?;
        Ok(receivers)
    }
}
