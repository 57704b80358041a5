//! Lazy, health-checked broker connection with bounded retry.

pub mod manager;
pub mod retry;

pub use manager::{ConnectionManager, ConnectionState};
pub use retry::{Backoff, RetryPolicy};
