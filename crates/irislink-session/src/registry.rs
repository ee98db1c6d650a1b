//! Subscription bookkeeping.
//!
//! The chat client forgets every subscription when the connection drops,
//! so the session keeps its own list and replays it after each
//! successful authentication. Entries are keyed by event name *and*
//! scoping arguments: `VOICE_STATE_UPDATE` for channel 5 and for
//! channel 6 are two different subscriptions.

use std::collections::HashSet;

use serde_json::Value;

/// One subscription: an event name plus optional scoping arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub event: String,
    pub args: Option<Value>,
}

impl Subscription {
    pub fn new(event: impl Into<String>, args: Option<Value>) -> Self {
        Self {
            event: event.into(),
            args,
        }
    }

    /// Identity of this subscription. `None` and `{}` are the same
    /// scope, and object keys are compared sorted.
    pub fn key(&self) -> String {
        let args = match &self.args {
            None => String::new(),
            Some(Value::Object(map)) if map.is_empty() => String::new(),
            Some(value) => canonical_json(value),
        };
        format!("{}|{}", self.event, args)
    }
}

/// Serializes `value` with object keys in sorted order at every depth.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        other => other.to_string(),
    }
}

/// The set of active subscriptions, in the order they were added.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: Vec<Subscription>,
    keys: HashSet<String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscription. Returns `false` if it was already present.
    pub fn insert(&mut self, subscription: Subscription) -> bool {
        if !self.keys.insert(subscription.key()) {
            return false;
        }
        self.entries.push(subscription);
        true
    }

    /// Removes a subscription. Returns `false` if it was not present.
    pub fn remove(&mut self, subscription: &Subscription) -> bool {
        let key = subscription.key();
        if !self.keys.remove(&key) {
            return false;
        }
        self.entries.retain(|s| s.key() != key);
        true
    }

    pub fn contains(&self, subscription: &Subscription) -> bool {
        self.keys.contains(&subscription.key())
    }

    /// `true` if any subscription, with any scope, is for `event`.
    pub fn is_subscribed_to(&self, event: &str) -> bool {
        self.entries.iter().any(|s| s.event == event)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
