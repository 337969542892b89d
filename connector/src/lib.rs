//! FastyBird MQTT connector for the `/fb/v1` topic convention.
//!
//! Devices report their attributes, hardware and firmware details,
//! properties and controls on `/fb/v1/...` topics. This crate keeps one or
//! more broker connections alive, turns every valid inbound message into a
//! typed [`Entity`], buffers it in an [`IngressQueue`] and hands it to the
//! registered [`Consumer`]s. The [`ApiV1Publisher`] writes property values
//! and control commands back to the devices.
//!
//! # Example - Connector
//!
//! ```no_run
//! use fb_mqtt_connector::{Connector, ConnectorConfig, Entity};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConnectorConfig::from_yaml_str("clients:\n  - address: mqtt://127.0.0.1:1883")?;
//!     let connector = Connector::from_config(&config)?;
//!     connector.register_consumer(Arc::new(|entity: &Entity| {
//!         println!("{} {}", entity.kind(), entity.device());
//!         Ok(())
//!     }));
//!
//!     connector.start()?;
//!     connector
//!         .publisher()
//!         .publish_device_property("sensor-1", "interval", "30", None, None)
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     connector.stop();
//!     connector.wait().await;
//!     Ok(())
//! }
//! ```
//!
//! # Example - Parsing
//!
//! ```
//! use fb_mqtt_connector::{parse_message, Entity, IngressQueue};
//!
//! let entity = parse_message("/fb/v1/sensor-1/$property/temp/$unit", "°C", false).unwrap();
//! assert!(matches!(entity, Entity::DeviceProperty(_)));
//!
//! let queue = IngressQueue::new(10);
//! queue.append(entity).unwrap();
//! assert_eq!(queue.len(), 1);
//! ```

mod client;
mod config;
mod connector;
pub mod convention;
pub mod entity;
mod error;
mod handler;
mod parser;
mod pool;
mod publisher;
mod queue;
mod registry;
#[cfg(test)]
mod tests;
mod types;

pub use client::{Client, MqttClient};
pub use config::{ClientConfig, ConnectorConfig, RetryConfig, SysLogConfig, DEFAULT_PORT};
pub use connector::{Connector, Consumer};
pub use entity::{
    Attribute, AttributeName, AttributeValue, Control, Entity, Firmware, Hardware, Origin,
    Property,
};
pub use error::{Error, Result};
pub use handler::{
    ApiV1Handler, CommonHandler, Handler, Handlers, Message, Session, API_V1_TOPICS,
    COMMON_TOPICS,
};
pub use parser::parse_message;
pub use pool::ClientPool;
pub use publisher::{ApiV1Publisher, PUBLISH_QOS};
pub use queue::{IngressQueue, DEFAULT_CAPACITY};
pub use registry::{Subscription, SubscriptionRegistry};
pub use types::{ClientState, QoS};

/// Re-export commonly used items
pub mod prelude {
    pub use crate::{
        parse_message, ApiV1Publisher, Client, ClientPool, Connector, ConnectorConfig,
        Consumer, Entity, Error, Handler, IngressQueue, Message, QoS, Result, Session,
    };
}
