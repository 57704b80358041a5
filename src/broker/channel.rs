use std::collections::HashSet;

pub type SubscriberId = String;

/// A named channel on the in-process broker and the subscribers listening
/// to it.
#[derive(Debug, Default)]
pub struct Channel {
    pub name: String,
    pub subscribers: HashSet<SubscriberId>,
}

impl Channel {
    /// Creates an empty channel called `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: HashSet::new(),
        }
    }

    /// Adds a subscriber; subscribing twice has no effect.
    pub fn subscribe(&mut self, id: SubscriberId) {
        self.subscribers.insert(id);
    }

    /// Removes a subscriber if present.
    pub fn unsubscribe(&mut self, id: &SubscriberId) {
        self.subscribers.remove(id);
    }
}
