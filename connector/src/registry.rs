//! Subscription registry keyed by MQTT packet identifier.

use crate::types::QoS;
use parking_lot::Mutex;
use std::collections::HashMap;

/// A subscription request awaiting or holding broker confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub qos: QoS,
    pub message_id: u16,
}

/// Tracks subscriptions by the packet id their SUBSCRIBE went out with.
///
/// Written by client event loops and read by handlers, so every operation
/// takes a short internal lock.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    items: Mutex<HashMap<u16, Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a subscription. A record with the same id is replaced.
    pub fn create(&self, topic: impl Into<String>, qos: QoS, message_id: u16) -> Subscription {
        let subscription = Subscription {
            topic: topic.into(),
            qos,
            message_id,
        };
        self.items.lock().insert(message_id, subscription.clone());
        subscription
    }

    pub fn get_by_id(&self, message_id: u16) -> Option<Subscription> {
        self.items.lock().get(&message_id).cloned()
    }

    /// Latest record for a topic.
    pub fn find_by_topic(&self, topic: &str) -> Option<Subscription> {
        self.items
            .lock()
            .values()
            .filter(|s| s.topic == topic)
            .max_by_key(|s| s.message_id)
            .cloned()
    }

    /// Removes and returns a record. Unknown ids are ignored.
    pub fn delete(&self, message_id: u16) -> Option<Subscription> {
        self.items.lock().remove(&message_id)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }
}
