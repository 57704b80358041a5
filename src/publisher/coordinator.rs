//! Publisher
//!
//! One `Publisher` owns the broker link, the publish defaults and the
//! timestamp clock for every call site that shares it (usually through an
//! `Arc<Publisher>`). All of that state sits behind a single async mutex:
//! callers are served one at a time, and a caller that arrives during an
//! outage waits behind the reconnect in progress.
//!
//! `publish` is fail-soft. Whatever goes wrong is logged and reported as
//! `false`; events are never queued or retried, so a `false` means the
//! event is lost.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::envelope::{EventEnvelope, PublishClock};
use crate::config::{ConfigResolver, Settings};
use crate::connection::{ConnectionManager, ConnectionState};
use crate::transport::{BrokerConnector, RedisConnector};
use crate::utils::PublishError;

/// Channel and broker config used by calls that do not name their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishDefaults {
    pub channel: String,
    pub config_name: String,
}

impl From<&Settings> for PublishDefaults {
    fn from(settings: &Settings) -> Self {
        Self {
            channel: settings.publisher.channel.clone(),
            config_name: settings.publisher.config_name.clone(),
        }
    }
}

/// Shared event publisher: one broker link, one set of defaults.
///
/// Construct it once and hand it to every call site, usually as an
/// `Arc<Publisher>`.
pub struct Publisher {
    inner: Mutex<Inner>,
}

struct Inner {
    connection: ConnectionManager,
    defaults: PublishDefaults,
    clock: PublishClock,
}

impl Publisher {
    /// A disconnected publisher using `connector`, with defaults and retry
    /// policy taken from `settings`.
    pub fn new(settings: Settings, connector: Arc<dyn BrokerConnector>) -> Self {
        let defaults = PublishDefaults::from(&settings);
        let connection = ConnectionManager::new(ConfigResolver::new(settings), connector);
        Self::from_parts(connection, defaults)
    }

    /// A publisher that talks to Redis.
    pub fn redis(settings: Settings) -> Self {
        Self::new(settings, Arc::new(RedisConnector))
    }

    /// A publisher around an existing connection manager.
    pub fn from_parts(connection: ConnectionManager, defaults: PublishDefaults) -> Self {
        Self {
            inner: Mutex::new(Inner {
                connection,
                defaults,
                clock: PublishClock::default(),
            }),
        }
    }

    /// Publishes `event` with `data` and reports whether the broker accepted
    /// it.
    ///
    /// A `channel` or `config_name` given here replaces the stored default
    /// and stays in effect for every later call, including calls that pass
    /// `None`. A new `config_name` is only used once the current link has to
    /// be (re)opened. Use `publish_ephemeral` to target a channel for one
    /// call only.
    pub async fn publish(
        &self,
        event: &str,
        data: Map<String, Value>,
        channel: Option<&str>,
        config_name: Option<&str>,
    ) -> bool {
        let mut inner = self.inner.lock().await;

        if let Some(name) = config_name {
            inner.defaults.config_name = name.to_string();
        }
        if let Some(channel) = channel {
            inner.defaults.channel = channel.to_string();
        }

        let channel = inner.defaults.channel.clone();
        inner.send(event, data, &channel).await
    }

    /// Publishes on `channel` without touching the stored defaults.
    pub async fn publish_ephemeral(&self, event: &str, data: Map<String, Value>, channel: &str) -> bool {
        self.inner.lock().await.send(event, data, channel).await
    }

    /// Changes the channel used by calls that do not name one.
    pub async fn set_default_channel(&self, channel: &str) {
        self.inner.lock().await.defaults.channel = channel.to_string();
    }

    /// Changes which broker config the next (re)connect uses. A healthy
    /// link is kept.
    pub async fn set_default_config_name(&self, config_name: &str) {
        self.inner.lock().await.defaults.config_name = config_name.to_string();
    }

    /// The current defaults.
    pub async fn defaults(&self) -> PublishDefaults {
        self.inner.lock().await.defaults.clone()
    }

    /// Connects or probes the live link; `true` when a healthy link exists
    /// afterwards.
    pub async fn check(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let config_name = inner.defaults.config_name.clone();
        inner.connection.ping_connection(&config_name).await
    }

    /// State of the underlying connection.
    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.connection.state()
    }

    /// Service name stamped on envelopes; `None` until the first connect.
    pub async fn service_name(&self) -> Option<String> {
        self.inner
            .lock()
            .await
            .connection
            .service_name()
            .map(str::to_string)
    }
}

impl Inner {
    async fn send(&mut self, event: &str, data: Map<String, Value>, channel: &str) -> bool {
        let config_name = self.defaults.config_name.clone();
        if !self.connection.ping_connection(&config_name).await {
            return false;
        }

        let service = self
            .connection
            .service_name()
            .unwrap_or(Settings::UNKNOWN_SERVICE);
        let envelope = EventEnvelope::new(event, service, self.clock.stamp(), data);

        let payload = match envelope.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!(event, "{}", PublishError::from(e));
                return false;
            }
        };

        match self.connection.publish(channel, &payload).await {
            Ok(receivers) => {
                debug!(channel, receivers, "Published event {event}");
                true
            }
            Err(e) => {
                error!("{e}");
                false
            }
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher").finish_non_exhaustive()
    }
}
