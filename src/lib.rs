//! # eventpub
//!
//! `eventpub` publishes structured event envelopes to a Redis pub/sub broker
//! on behalf of any number of call sites in a process. The broker link is
//! opened lazily, probed before every reuse and re-established with a bounded
//! retry when it goes away. Publishing is fail-soft: callers get a `bool`,
//! never an error.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use serde_json::json;
//!
//! let settings = eventpub::config::load_config()?;
//! let publisher = eventpub::Publisher::redis(settings);
//! let data = json!({"id": 42}).as_object().cloned().unwrap_or_default();
//! let delivered = publisher.publish("user.created", data, None, None).await;
//! # let _ = delivered;
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - `config`: loads settings and resolves named broker connections.
//! - `connection`: the lazy connection, retry policy and liveness checks.
//! - `publisher`: envelope construction and the shared `Publisher`.
//! - `transport`: the broker seam and its Redis implementation.
//! - `broker`: an in-process broker for tests (`memory-broker` feature).
//! - `utils`: error types and logging setup.

#[cfg(any(test, feature = "memory-broker"))]
pub mod broker;
pub mod config;
pub mod connection;
pub mod publisher;
pub mod transport;
pub mod utils;

pub use publisher::{EventEnvelope, PublishDefaults, Publisher};
pub use utils::{PublishError, TransportError};
