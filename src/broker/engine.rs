//! Broker engine
//!
//! `MemoryBroker` keeps channels, subscribers and everything that was
//! published, and exposes switches that make the next connect, AUTH, PING or
//! PUBLISH fail. It is held behind `Arc<Mutex<_>>` (`SharedBroker`); the lock
//! is never held across an await point.
//!
//! `MemoryConnector` opens `MemoryLink`s onto a shared broker. A link belongs
//! to a connection generation; `drop_connections` starts a new generation so
//! every existing link fails its next operation, the way a restarted server
//! closes its sockets.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use super::channel::{Channel, SubscriberId};
use super::message::BrokerMessage;
use crate::transport::{BrokerConnector, BrokerLink};
use crate::utils::TransportError;

pub type SharedBroker = Arc<Mutex<MemoryBroker>>;

/// One call to `MemoryConnector::connect`, accepted or not.
#[derive(Debug, Clone)]
pub struct ConnectAttempt {
    pub host: String,
    pub port: u16,
    pub at: Instant,
    pub accepted: bool,
}

/// In-process broker state: channels, subscribers, everything published and
/// every connection attempt, plus the fault switches.
#[derive(Debug)]
pub struct MemoryBroker {
    channels: HashMap<String, Channel>,
    subscribers: HashMap<SubscriberId, UnboundedSender<BrokerMessage>>,
    published: Vec<BrokerMessage>,
    connect_log: Vec<ConnectAttempt>,
    reachable: bool,
    unreachable_hosts: HashSet<String>,
    refuse_next: u32,
    password: Option<String>,
    fail_publishes: bool,
    generation: u64,
}

impl MemoryBroker {
    /// Number of selectable databases, as in a default Redis server.
    pub const DATABASES: i64 = 16;
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Creates a reachable broker with no channels and no password.
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            subscribers: HashMap::new(),
            published: Vec::new(),
            connect_log: Vec::new(),
            reachable: true,
            unreachable_hosts: HashSet::new(),
            refuse_next: 0,
            password: None,
            fail_publishes: false,
            generation: 0,
        }
    }

    /// A new broker behind `Arc<Mutex<_>>`, ready for `MemoryConnector`.
    pub fn shared() -> SharedBroker {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Takes the whole broker down (or brings it back). Going down also
    /// closes every open link.
    pub fn set_reachable(&mut self, reachable: bool) {
        if self.reachable && !reachable {
            self.generation += 1;
        }
        self.reachable = reachable;
    }

    /// Refuses connections addressed to `host` only.
    pub fn set_host_reachable(&mut self, host: &str, reachable: bool) {
        if reachable {
            self.unreachable_hosts.remove(host);
        } else {
            self.unreachable_hosts.insert(host.to_string());
        }
    }

    /// Refuses the next `count` connection attempts, then accepts again.
    pub fn refuse_connects(&mut self, count: u32) {
        self.refuse_next = count;
    }

    /// Requires AUTH with `password` before any other command; `None` turns
    /// authentication off.
    pub fn require_password(&mut self, password: Option<&str>) {
        self.password = password.map(str::to_string);
    }

    /// Makes every PUBLISH fail while set.
    pub fn fail_publishes(&mut self, fail: bool) {
        self.fail_publishes = fail;
    }

    /// Closes every open link without taking the broker down.
    pub fn drop_connections(&mut self) {
        self.generation += 1;
    }

    /// Subscribes a new receiver to `channel`, creating the channel if needed.
    pub fn subscribe(&mut self, channel: &str) -> (SubscriberId, UnboundedReceiver<BrokerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4().to_string();
        self.subscribers.insert(id.clone(), tx);
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| Channel::new(channel))
            .subscribe(id.clone());
        (id, rx)
    }

    /// Removes `subscriber` from `channel` only.
    pub fn unsubscribe(&mut self, channel: &str, subscriber: &SubscriberId) {
        if let Some(c) = self.channels.get_mut(channel) {
            c.unsubscribe(subscriber);
        }
    }

    /// Removes a subscriber from the broker and from every channel.
    pub fn remove_subscriber(&mut self, subscriber: &SubscriberId) {
        self.subscribers.remove(subscriber);
        for channel in self.channels.values_mut() {
            channel.unsubscribe(subscriber);
        }
    }

    /// The channel called `name`, if anyone ever subscribed to it.
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    /// Every message accepted so far, in publish order.
    pub fn published(&self) -> &[BrokerMessage] {
        &self.published
    }

    /// Messages accepted on `channel`, in publish order.
    pub fn published_on(&self, channel: &str) -> Vec<&BrokerMessage> {
        self.published
            .iter()
            .filter(|m| m.channel == channel)
            .collect()
    }

    /// Every connection attempt so far, accepted or refused.
    pub fn connect_attempts(&self) -> &[ConnectAttempt] {
        &self.connect_log
    }

    fn accept(&mut self, host: &str, port: u16) -> Result<u64, TransportError> {
        let accepted = if !self.reachable || self.unreachable_hosts.contains(host) {
            false
        } else if self.refuse_next > 0 {
            self.refuse_next -= 1;
            false
        } else {
            true
        };

        self.connect_log.push(ConnectAttempt {
            host: host.to_string(),
            port,
            at: Instant::now(),
            accepted,
        });

        if accepted {
            Ok(self.generation)
        } else {
            Err(TransportError::Unreachable {
                host: host.to_string(),
                port,
            })
        }
    }

    fn check_open(&self, generation: u64) -> Result<(), TransportError> {
        if !self.reachable || generation != self.generation {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    /// Records `message` and hands it to every subscriber of its channel.
    /// Returns the number of subscribers it was delivered to.
    fn deliver(&mut self, message: BrokerMessage) -> i64 {
        let mut receivers = 0;
        if let Some(channel) = self.channels.get(&message.channel) {
            for sub_id in &channel.subscribers {
                match self.subscribers.get(sub_id) {
                    Some(sender) => {
                        if let Err(e) = sender.send(message.clone()) {
                            warn!("Failed to deliver to {sub_id}: {e}");
                        } else {
                            receivers += 1;
                        }
                    }
                    None => warn!("No subscriber registered with id: {sub_id}"),
                }
            }
        } else {
            debug!("Channel '{}' has no subscribers.", message.channel);
        }
        self.published.push(message);
        receivers
    }
}

/// Opens links onto a shared `MemoryBroker`.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    broker: SharedBroker,
}

impl MemoryConnector {
    /// A connector opening links onto `broker`.
    pub fn new(broker: SharedBroker) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl BrokerConnector for MemoryConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn BrokerLink>, TransportError> {
        let generation = lock(&self.broker)?.accept(host, port)?;
        Ok(Box::new(MemoryLink {
            broker: self.broker.clone(),
            generation,
            authenticated: false,
            database: 0,
        }))
    }
}

struct MemoryLink {
    broker: SharedBroker,
    generation: u64,
    authenticated: bool,
    database: i64,
}

fn lock(broker: &SharedBroker) -> Result<MutexGuard<'_, MemoryBroker>, TransportError> {
    broker.lock().map_err(|_| TransportError::Closed)
}

impl MemoryLink {
    fn open_broker(&self) -> Result<MutexGuard<'_, MemoryBroker>, TransportError> {
        let broker = lock(&self.broker)?;
        broker.check_open(self.generation)?;
        if broker.password.is_some() && !self.authenticated {
            return Err(TransportError::Rejected(
                "NOAUTH Authentication required.".to_string(),
            ));
        }
        Ok(broker)
    }
}

#[async_trait]
impl BrokerLink for MemoryLink {
    async fn auth(&mut self, password: &str) -> Result<(), TransportError> {
        let broker = lock(&self.broker)?;
        broker.check_open(self.generation)?;
        match broker.password.as_deref() {
            Some(expected) if expected == password => {
                self.authenticated = true;
                Ok(())
            }
            Some(_) => Err(TransportError::Rejected(
                "WRONGPASS invalid username-password pair".to_string(),
            )),
            None => Err(TransportError::Rejected(
                "ERR AUTH called without any password configured".to_string(),
            )),
        }
    }

    async fn select(&mut self, database: i64) -> Result<(), TransportError> {
        self.open_broker()?;
        if !(0..MemoryBroker::DATABASES).contains(&database) {
            return Err(TransportError::Rejected(
                "ERR DB index is out of range".to_string(),
            ));
        }
        self.database = database;
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.open_broker().map(|_| ())
    }

    async fn publish(&mut self, channel: &str, payload: &str) -> Result<i64, TransportError> {
        let mut broker = self.open_broker()?;
        if broker.fail_publishes {
            return Err(TransportError::Rejected(
                "ERR publish rejected".to_string(),
            ));
        }
        let message = BrokerMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
            database: self.database,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        Ok(broker.deliver(message))
    }
}
