use std::collections::HashMap;

use serde::Deserialize;

/// Top-level configuration settings for the publisher.
///
/// Includes the service name stamped on every envelope, the publisher
/// defaults and the table of named broker connections.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub microservice: String,
    pub publisher: PublisherSettings,
    pub redis: HashMap<String, BrokerSettings>,
}

/// Defaults used by `Publisher` until a call overrides them.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PublisherSettings {
    pub channel: String,
    pub config_name: String,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

/// One entry of the `redis` table, as written in configuration.
///
/// Every field is optional here; `ConfigResolver` decides what an empty
/// entry means and fills in the rest.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct BrokerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub database: Option<i64>,
}

impl BrokerSettings {
    /// True when the entry names no host.
    pub fn is_empty(&self) -> bool {
        self.host.as_deref().is_none_or(|h| h.trim().is_empty())
    }

    /// Fields set in `self` win; the rest come from `base`.
    pub fn layered_over(self, base: BrokerSettings) -> BrokerSettings {
        BrokerSettings {
            host: self.host.or(base.host),
            port: self.port.or(base.port),
            password: self.password.or(base.password),
            database: self.database.or(base.database),
        }
    }
}

/// Merges every entry whose key equals `name` ignoring ASCII case.
///
/// The file source keeps the case of its keys while the environment source
/// lower-cases them, so all-lowercase keys are layered last, field by field.
pub fn merge_broker_entries<'a>(
    entries: impl IntoIterator<Item = (&'a String, &'a BrokerSettings)>,
    name: &str,
) -> Option<BrokerSettings> {
    let mut matching: Vec<_> = entries
        .into_iter()
        .filter(|(key, _)| key.eq_ignore_ascii_case(name))
        .collect();
    matching.sort_by_key(|(key, _)| (**key == key.to_ascii_lowercase(), (*key).clone()));

    matching
        .into_iter()
        .map(|(_, entry)| entry.clone())
        .reduce(|base, over| over.layered_over(base))
}

/// Folds the `redis` table onto lower-cased keys.
pub fn fold_broker_table(table: HashMap<String, BrokerSettings>) -> HashMap<String, BrokerSettings> {
    let mut folded = HashMap::new();
    for name in table.keys() {
        let key = name.to_ascii_lowercase();
        if folded.contains_key(&key) {
            continue;
        }
        if let Some(entry) = merge_broker_entries(&table, &key) {
            folded.insert(key, entry);
        }
    }
    folded
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub microservice: Option<String>,
    pub publisher: Option<PartialPublisherSettings>,
    #[serde(default)]
    pub redis: HashMap<String, BrokerSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialPublisherSettings {
    pub channel: Option<String>,
    pub config_name: Option<String>,
    pub max_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

impl Settings {
    /// Service name used when `microservice` is not configured.
    pub const UNKNOWN_SERVICE: &'static str = "Unknown";
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            microservice: Self::UNKNOWN_SERVICE.to_string(),
            publisher: PublisherSettings {
                channel: "main".to_string(),
                config_name: "GeneralEventsRedis".to_string(),
                max_attempts: 10,
                retry_delay_ms: 1000,
            },
            redis: HashMap::new(),
        }
    }
}
