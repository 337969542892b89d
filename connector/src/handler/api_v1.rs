//! Ingestion of v1 convention messages.

use super::{Handler, Message, Session};
use crate::convention;
use crate::error::Result;
use crate::parser::parse_message;
use crate::queue::IngressQueue;
use crate::types::QoS;
use tracing::{debug, error, warn};

/// Wildcard filters covering every v1 topic depth, with and without `$child`.
pub const API_V1_TOPICS: &[&str] = &[
    "/fb/v1/+/+",
    "/fb/v1/+/+/+",
    "/fb/v1/+/+/+/+",
    "/fb/v1/+/+/+/+/+",
    "/fb/v1/+/+/+/+/+/+",
    "/fb/v1/+/+/+/+/+/+/+",
    "/fb/v1/+/$child/+/+",
    "/fb/v1/+/$child/+/+/+",
    "/fb/v1/+/$child/+/+/+/+",
    "/fb/v1/+/$child/+/+/+/+/+",
    "/fb/v1/+/$child/+/+/+/+/+/+",
    "/fb/v1/+/$child/+/+/+/+/+/+/+",
];

/// Subscribes to the v1 tree and feeds parsed entities into the queue.
#[derive(Debug, Clone)]
pub struct ApiV1Handler {
    queue: IngressQueue,
}

impl ApiV1Handler {
    pub fn new(queue: IngressQueue) -> Self {
        Self { queue }
    }
}

impl Handler for ApiV1Handler {
    fn on_connect(&self, session: &dyn Session) -> Result<()> {
        for topic in API_V1_TOPICS {
            session.subscribe(topic, QoS::AtMostOnce)?;
        }
        Ok(())
    }

    fn on_message(&self, session: &dyn Session, message: &Message) -> Result<()> {
        let topic = message.topic.as_str();
        if !convention::is_convention(topic)
            || !convention::is_version(topic)
            || convention::is_command(topic)
        {
            return Ok(());
        }

        if !convention::validate(topic) {
            warn!(topic, "received topic is not a valid v1 convention topic");
            return Ok(());
        }

        let mut entity = match parse_message(topic, &message.payload_lossy(), message.retain) {
            Ok(entity) => entity,
            Err(e) if e.is_message() => {
                error!(topic, error = %e, "received message could not be parsed");
                return Ok(());
            }
            Err(e) => {
                error!(topic, error = %e, "parsed values are not valid");
                return Ok(());
            }
        };

        entity.set_client_id(session.client_id());
        debug!(topic, kind = entity.kind(), device = entity.device(), "entity parsed");
        // A full queue is logged by the queue itself.
        let _ = self.queue.append(entity);
        Ok(())
    }
}
