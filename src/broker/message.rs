use serde::{Deserialize, Serialize};

/// A message as delivered by the in-process broker.
///
/// # Fields
///
/// - `channel` - The channel the message was published on.
/// - `payload` - The raw payload, for the publisher a JSON event envelope.
/// - `database` - The database index selected on the publishing link.
/// - `timestamp` - Unix timestamp in milliseconds at which the broker accepted it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrokerMessage {
    pub channel: String,
    pub payload: String,
    pub database: i64,
    pub timestamp: i64,
}

impl BrokerMessage {
    /// Parses the payload as JSON.
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.payload)
    }
}
