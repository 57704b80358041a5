//! Error types used within `eventpub`.
//!
//! `TransportError` describes what went wrong on the wire; `PublishError`
//! describes which stage of connect/publish failed. Neither ever reaches the
//! caller of `Publisher::publish`: they are logged and turned into `false`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("broker at {host}:{port} is unreachable")]
    Unreachable { host: String, port: u16 },

    #[error("connection closed")]
    Closed,

    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("cannot find broker configuration by {0}")]
    ConfigurationMissing(String),

    #[error("unable to connect broker {name} after {attempts} attempts")]
    ConnectionFailed { name: String, attempts: u32 },

    #[error("authentication against broker {name} failed: {source}")]
    AuthFailed {
        name: String,
        #[source]
        source: TransportError,
    },

    #[error("selecting database {database} on broker {name} failed: {source}")]
    SelectFailed {
        name: String,
        database: i64,
        #[source]
        source: TransportError,
    },

    #[error("failed to serialize event envelope: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("publishing to channel {channel} failed: {source}")]
    PublishFailed {
        channel: String,
        #[source]
        source: TransportError,
    },

    #[error("no broker connection")]
    NotConnected,
}
