//! Connection manager
//!
//! Owns the single broker link of a publisher. The link is opened lazily on
//! first use, probed with PING before every reuse and fully replaced when the
//! probe fails. Opening a link is the only retried operation:
//!
//! 1. cache the service name (first connect only)
//! 2. resolve the broker config; a missing config fails immediately
//! 3. up to `max_attempts` transport connects, `delay` apart
//! 4. AUTH when a password is configured, then SELECT the database
//!
//! The manager is plain `&mut self` state; `Publisher` keeps it behind an
//! async mutex so connect, ping and publish never interleave. A connect
//! during an outage holds that mutex for the whole retry budget.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use super::retry::RetryPolicy;
use crate::config::{BrokerConfig, ConfigResolver};
use crate::transport::{BrokerConnector, BrokerLink};
use crate::utils::PublishError;

/// Where the connection manager is in its connect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The last connect spent its whole retry budget. The next ping starts a
    /// new budget.
    Exhausted,
}

/// Owner of the single broker link, see the module docs.
pub struct ConnectionManager {
    resolver: ConfigResolver,
    connector: Arc<dyn BrokerConnector>,
    policy: RetryPolicy,
    link: Option<Box<dyn BrokerLink>>,
    state: ConnectionState,
    service_name: Option<String>,
    broker: Option<BrokerConfig>,
}

impl ConnectionManager {
    /// Creates a disconnected manager. The retry policy comes from the
    /// `publisher` settings.
    pub fn new(resolver: ConfigResolver, connector: Arc<dyn BrokerConnector>) -> Self {
        let policy = RetryPolicy::new(
            resolver.settings().publisher.max_attempts,
            resolver.retry_delay(),
        );
        Self {
            resolver,
            connector,
            policy,
            link: None,
            state: ConnectionState::Disconnected,
            service_name: None,
            broker: None,
        }
    }

    /// Replaces the retry policy taken from settings.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Service name cached at first connect; `None` before that.
    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    /// Config of the broker the live link points at.
    pub fn broker(&self) -> Option<&BrokerConfig> {
        self.broker.as_ref()
    }

    /// Drops the live link, if any.
    pub fn disconnect(&mut self) {
        self.link = None;
        self.broker = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Opens a new link to the broker named `config_name`, replacing the
    /// current one.
    pub async fn connect(&mut self, config_name: &str) -> Result<(), PublishError> {
        if self.service_name.is_none() {
            self.service_name = Some(self.resolver.service_name().to_string());
        }

        self.disconnect();
        let config = self.resolver.resolve(config_name)?;
        self.state = ConnectionState::Connecting;

        let mut backoff = self.policy.backoff();
        let mut link = loop {
            let Some(attempt) = backoff.next_attempt() else {
                self.state = ConnectionState::Exhausted;
                return Err(PublishError::ConnectionFailed {
                    name: config.name,
                    attempts: backoff.attempts(),
                });
            };

            match self.connector.connect(&config.host, config.port).await {
                Ok(link) => {
                    info!(
                        "Connected to broker {} ({} attempts)",
                        config.name, attempt
                    );
                    break link;
                }
                Err(err) => {
                    error!(broker = %config.name, host = %config.host, port = config.port, "{err}");
                    info!(
                        "Retrying to connect broker {} ({} attempts)",
                        config.name, attempt
                    );
                    tokio::time::sleep(backoff.delay()).await;
                }
            }
        };

        if let Err(err) = Self::handshake(&mut *link, &config).await {
            self.state = ConnectionState::Disconnected;
            return Err(err);
        }

        self.link = Some(link);
        self.broker = Some(config);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    async fn handshake(link: &mut dyn BrokerLink, config: &BrokerConfig) -> Result<(), PublishError> {
        if !config.password.is_empty() {
            link.auth(&config.password)
                .await
                .map_err(|source| PublishError::AuthFailed {
                    name: config.name.clone(),
                    source,
                })?;
        }

        link.select(config.database)
            .await
            .map_err(|source| PublishError::SelectFailed {
                name: config.name.clone(),
                database: config.database,
                source,
            })
    }

    /// Makes sure a healthy link exists, connecting or reconnecting to
    /// `config_name` when needed. Failures are logged, never returned.
    pub async fn ping_connection(&mut self, config_name: &str) -> bool {
        if let Some(link) = self.link.as_mut() {
            match link.ping().await {
                Ok(()) => return true,
                Err(err) => {
                    warn!("Liveness probe failed, reconnecting: {err}");
                    self.disconnect();
                }
            }
        }

        match self.connect(config_name).await {
            Ok(()) => true,
            Err(err) => {
                error!("{err}");
                false
            }
        }
    }

    /// Sends `payload` on `channel` over the live link. One attempt, no
    /// reconnect.
    pub async fn publish(&mut self, channel: &str, payload: &str) -> Result<i64, PublishError> {
        let link = self.link.as_mut().ok_or(PublishError::NotConnected)?;
        link.publish(channel, payload)
            .await
            .map_err(|source| PublishError::PublishFailed {
                channel: channel.to_string(),
                source,
            })
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &self.state)
            .field("policy", &self.policy)
            .field("service_name", &self.service_name)
            .field("broker", &self.broker.as_ref().map(|b| &b.name))
            .finish()
    }
}
