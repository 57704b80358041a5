//! Process configuration and the resolver for named broker connections.

mod settings;

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};

use crate::utils::PublishError;
use settings::{PartialSettings, fold_broker_table, merge_broker_entries};

pub use settings::{BrokerSettings, PublisherSettings, Settings};

/// Port used when a broker entry does not name one.
pub const DEFAULT_PORT: u16 = 6379;

/// Loads the configuration from `config/default` and `EVENTPUB__*` variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Loads the configuration from the given file (extension optional) and the
/// environment, merging what is present with `Settings::default()`.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("EVENTPUB")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let default = Settings::default();

    if partial
        .publisher
        .as_ref()
        .and_then(|p| p.max_attempts)
        .is_some_and(|attempts| attempts == 0)
    {
        return Err(ConfigError::Message(
            "publisher.max_attempts must be at least 1".to_string(),
        ));
    }

    Ok(Settings {
        microservice: partial
            .microservice
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(default.microservice),
        publisher: PublisherSettings {
            channel: partial
                .publisher
                .as_ref()
                .and_then(|p| p.channel.clone())
                .unwrap_or(default.publisher.channel),
            config_name: partial
                .publisher
                .as_ref()
                .and_then(|p| p.config_name.clone())
                .unwrap_or(default.publisher.config_name),
            max_attempts: partial
                .publisher
                .as_ref()
                .and_then(|p| p.max_attempts)
                .unwrap_or(default.publisher.max_attempts),
            retry_delay_ms: partial
                .publisher
                .as_ref()
                .and_then(|p| p.retry_delay_ms)
                .unwrap_or(default.publisher.retry_delay_ms),
        },
        redis: fold_broker_table(partial.redis),
    })
}

/// Connection settings of one named broker, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub password: String,
    pub database: i64,
}

/// Read-only view over `Settings` that answers the two questions the
/// connection manager asks: which service am I, and where is broker `name`.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    settings: Settings,
}

impl ConfigResolver {
    /// Wraps loaded settings.
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The configured `microservice` name.
    pub fn service_name(&self) -> &str {
        &self.settings.microservice
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.settings.publisher.retry_delay_ms)
    }

    /// Looks `name` up in the `redis` table, ignoring ASCII case. Entries
    /// that differ only in case are merged field by field, lower-cased
    /// (environment) keys on top.
    pub fn resolve(&self, name: &str) -> Result<BrokerConfig, PublishError> {
        let entry = merge_broker_entries(&self.settings.redis, name);

        let entry = match entry.as_ref() {
            Some(entry) if !entry.is_empty() => entry,
            _ => return Err(PublishError::ConfigurationMissing(name.to_string())),
        };

        Ok(BrokerConfig {
            name: name.to_string(),
            host: entry.host.clone().unwrap_or_default(),
            port: entry.port.unwrap_or(DEFAULT_PORT),
            password: entry.password.clone().unwrap_or_default(),
            database: entry.database.unwrap_or(0),
        })
    }
}
