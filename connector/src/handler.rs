//! Broker event handlers.
//!
//! A client reports broker events (connection up/down, inbound messages,
//! subscribe and unsubscribe acknowledgements, transport log lines) to one
//! [`Handler`]. [`Handlers`] fans an event out to every registered handler
//! in registration order.
//!
//! Handlers run on the client's event loop task and must not block.

mod api_v1;
mod common;

pub use api_v1::{ApiV1Handler, API_V1_TOPICS};
pub use common::{CommonHandler, COMMON_TOPICS};

use crate::error::Result;
use crate::registry::SubscriptionRegistry;
use crate::types::QoS;
use bytes::Bytes;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{error, Level};
use uuid::Uuid;

/// MQTT message received from a subscription.
#[derive(Debug, Clone)]
pub struct Message {
    /// Topic the message was published to.
    pub topic: String,
    /// Message payload.
    pub payload: Bytes,
    /// QoS level.
    pub qos: QoS,
    /// Retain flag.
    pub retain: bool,
    /// Packet ID (for QoS > 0).
    pub packet_id: Option<u16>,
}

impl Message {
    /// Create a new message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
            packet_id: None,
        }
    }

    /// Set the retain flag.
    pub fn retained(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    /// Payload decoded as UTF-8, invalid sequences replaced.
    pub fn payload_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Synchronous view of a connected client handed to handlers.
pub trait Session: Send + Sync {
    /// Identifier of the logical client.
    fn client_id(&self) -> Uuid;

    /// Subscriptions of this client keyed by packet id.
    fn subscriptions(&self) -> &SubscriptionRegistry;

    /// Queues a SUBSCRIBE without waiting for the broker.
    ///
    /// The subscription is recorded once its packet id is assigned.
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<()>;

    /// Queues an UNSUBSCRIBE without waiting for the broker.
    fn unsubscribe(&self, topic: &str) -> Result<()>;
}

/// Receiver of broker events. Every method defaults to a no-op.
pub trait Handler: Send + Sync {
    /// Connection to the broker is established.
    fn on_connect(&self, _session: &dyn Session) -> Result<()> {
        Ok(())
    }

    /// Connection to the broker is closed.
    fn on_disconnect(&self, _session: &dyn Session) {}

    /// A message arrived on one of the subscriptions.
    fn on_message(&self, _session: &dyn Session, _message: &Message) -> Result<()> {
        Ok(())
    }

    /// Broker acknowledged a SUBSCRIBE.
    fn on_subscribe(&self, _session: &dyn Session, _message_id: u16) {}

    /// Broker acknowledged an UNSUBSCRIBE of `topic`.
    fn on_unsubscribe(&self, _session: &dyn Session, _message_id: u16, _topic: &str) {}

    /// Transport level log line.
    fn on_log(&self, _session: &dyn Session, _level: Level, _message: &str) {}
}

/// Ordered list of handlers invoked one after another.
///
/// A failing handler is logged and does not stop the others.
#[derive(Default)]
pub struct Handlers {
    items: RwLock<Vec<Arc<dyn Handler>>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler.
    pub fn register(&self, handler: Arc<dyn Handler>) {
        self.items.write().push(handler);
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn Handler>> {
        self.items.read().clone()
    }
}

impl Handler for Handlers {
    fn on_connect(&self, session: &dyn Session) -> Result<()> {
        for handler in self.snapshot() {
            if let Err(e) = handler.on_connect(session) {
                error!(client_id = %session.client_id(), error = %e, "connect handler failed");
            }
        }
        Ok(())
    }

    fn on_disconnect(&self, session: &dyn Session) {
        for handler in self.snapshot() {
            handler.on_disconnect(session);
        }
    }

    fn on_message(&self, session: &dyn Session, message: &Message) -> Result<()> {
        for handler in self.snapshot() {
            if let Err(e) = handler.on_message(session, message) {
                error!(topic = %message.topic, error = %e, "message handler failed");
            }
        }
        Ok(())
    }

    fn on_subscribe(&self, session: &dyn Session, message_id: u16) {
        for handler in self.snapshot() {
            handler.on_subscribe(session, message_id);
        }
    }

    fn on_unsubscribe(&self, session: &dyn Session, message_id: u16, topic: &str) {
        for handler in self.snapshot() {
            handler.on_unsubscribe(session, message_id, topic);
        }
    }

    fn on_log(&self, session: &dyn Session, level: Level, message: &str) {
        for handler in self.snapshot() {
            handler.on_log(session, level, message);
        }
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers").field("len", &self.len()).finish()
    }
}
