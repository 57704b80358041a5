//! Event publishing on top of the connection manager.

pub mod coordinator;
pub mod envelope;

pub use coordinator::{PublishDefaults, Publisher};
pub use envelope::{EventEnvelope, PUBLISHED_TIME_FORMAT, PublishClock};

#[cfg(test)]
mod tests;
