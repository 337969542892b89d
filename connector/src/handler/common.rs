//! Broker housekeeping: subscription bookkeeping and `$SYS` log lines.

use super::{Handler, Message, Session};
use crate::config::SysLogConfig;
use crate::entity::{Entity, Origin, Property};
use crate::error::Result;
use crate::queue::IngressQueue;
use crate::types::QoS;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, error, info, warn, Level};

/// Broker topics every client subscribes to.
pub const COMMON_TOPICS: &[&str] = &["$SYS/broker/log/#"];

/// Property reported for a device once the broker logs its connection.
const IP_ADDRESS_PROPERTY: &str = "ip-address";

static SYS_LOG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$SYS/broker/log/([a-zA-Z0-9]+)").unwrap_or_else(|e| panic!("sys log: {e}"))
});

/// Logs subscription acknowledgements and re-emits broker log lines.
///
/// A "new client connected" line is turned into an `ip-address` property
/// of the connecting device. The line is split on commas and the fields are
/// picked by the offsets in [`SysLogConfig`]; this is a best-effort reading
/// of one broker's log format.
#[derive(Debug, Clone)]
pub struct CommonHandler {
    queue: IngressQueue,
    sys_log: SysLogConfig,
}

impl CommonHandler {
    pub fn new(queue: IngressQueue, sys_log: SysLogConfig) -> Self {
        Self { queue, sys_log }
    }

    /// Extracts `(device, ip address)` from a new client log line.
    fn new_client(&self, line: &str) -> Option<(String, String)> {
        if !line.contains(&self.sys_log.new_client_marker) {
            return None;
        }

        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        let field = |index: usize| parts.get(index).copied().filter(|v| !v.is_empty());

        let ip_address = field(self.sys_log.ip_address_field)?;
        let device = field(self.sys_log.device_field)?;
        field(self.sys_log.username_field)?;

        Some((device.to_string(), ip_address.to_string()))
    }
}

impl Handler for CommonHandler {
    fn on_connect(&self, session: &dyn Session) -> Result<()> {
        info!(client_id = %session.client_id(), "connected to MQTT broker");
        for topic in COMMON_TOPICS {
            session.subscribe(topic, QoS::AtMostOnce)?;
        }
        Ok(())
    }

    fn on_disconnect(&self, session: &dyn Session) {
        info!(client_id = %session.client_id(), "disconnected from MQTT broker");
    }

    fn on_subscribe(&self, session: &dyn Session, message_id: u16) {
        match session.subscriptions().get_by_id(message_id) {
            Some(subscription) => info!(topic = %subscription.topic, "subscribed to topic"),
            None => warn!(message_id, "subscribed to unknown topic"),
        }
    }

    fn on_unsubscribe(&self, session: &dyn Session, message_id: u16, topic: &str) {
        let registry = session.subscriptions();
        match registry.find_by_topic(topic) {
            Some(subscription) => {
                registry.delete(subscription.message_id);
                info!(topic, "unsubscribed from topic");
            }
            None => warn!(message_id, topic, "unsubscribed from unknown topic"),
        }
    }

    fn on_log(&self, session: &dyn Session, level: Level, message: &str) {
        let client_id = session.client_id();
        if level == Level::ERROR {
            error!(%client_id, "{message}");
        } else if level == Level::WARN {
            warn!(%client_id, "{message}");
        } else if level == Level::INFO {
            info!(%client_id, "{message}");
        } else {
            debug!(%client_id, "{message}");
        }
    }

    fn on_message(&self, session: &dyn Session, message: &Message) -> Result<()> {
        let Some(caps) = SYS_LOG.captures(&message.topic) else {
            return Ok(());
        };
        let level = caps.get(1).map_or("", |m| m.as_str()).to_lowercase();
        let line = message.payload_lossy();

        match level.as_str() {
            "n" => {
                info!("{line}");
                if let Some((device, ip_address)) = self.new_client(&line) {
                    let mut property = Property::new(
                        Origin::new(device, None).with_client(session.client_id()),
                        None,
                        IP_ADDRESS_PROPERTY,
                    );
                    property.set_value(&ip_address);
                    let _ = self.queue.append(Entity::DeviceProperty(property));
                }
            }
            "i" => info!("{line}"),
            "e" => error!("{line}"),
            "w" => warn!("{line}"),
            _ => debug!("{line}"),
        }
        Ok(())
    }
}
