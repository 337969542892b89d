//! Outbound v1 publisher.
//!
//! Property writes and control commands are published to the `/set` topics
//! of the addressed device or channel:
//!
//! ```text
//! /fb/v1/{DEVICE}/$property/{ID}/set
//! /fb/v1/{PARENT}/$child/{DEVICE}/$property/{ID}/set
//! /fb/v1/{DEVICE}/$control/{CONTROL}/set
//! /fb/v1/{DEVICE}/$channel/{CHANNEL}/$property/{ID}/set
//! /fb/v1/{DEVICE}/$channel/{CHANNEL}/$control/{CONTROL}/set
//! ```

use crate::entity::ControlName;
use crate::error::{Error, Result};
use crate::pool::ClientPool;
use crate::types::QoS;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// QoS used for every outbound message.
pub const PUBLISH_QOS: QoS = QoS::AtLeastOnce;

/// Device or channel addressed by an outbound message.
#[derive(Debug, Clone, Copy)]
struct Target<'a> {
    parent: Option<&'a str>,
    device: &'a str,
    channel: Option<&'a str>,
}

impl Target<'_> {
    fn prefix(&self) -> String {
        let mut topic = String::from("/fb/v1/");
        if let Some(parent) = self.parent {
            topic.push_str(parent);
            topic.push_str("/$child/");
        }
        topic.push_str(self.device);
        if let Some(channel) = self.channel {
            topic.push_str("/$channel/");
            topic.push_str(channel);
        }
        topic
    }

    fn property(&self, identifier: &str) -> String {
        format!("{}/$property/{identifier}/set", self.prefix())
    }

    fn control(&self, control: &str) -> String {
        format!("{}/$control/{control}/set", self.prefix())
    }
}

/// Publishes v1 commands through a [`ClientPool`].
///
/// Every method takes an optional `parent` for child devices and an
/// optional client filter; without a filter every enabled client publishes.
#[derive(Debug, Clone)]
pub struct ApiV1Publisher {
    pool: Arc<ClientPool>,
}

impl ApiV1Publisher {
    pub fn new(pool: Arc<ClientPool>) -> Self {
        Self { pool }
    }

    pub async fn publish_device_property(
        &self,
        device: &str,
        identifier: &str,
        payload: &str,
        parent: Option<&str>,
        clients: Option<&[Uuid]>,
    ) -> Result<()> {
        let target = Target { parent, device, channel: None };
        self.send(&target.property(identifier), payload, clients).await
    }

    /// Publishes a device control command. A `configure` payload must be
    /// valid JSON.
    pub async fn publish_device_command(
        &self,
        device: &str,
        command: &str,
        payload: &str,
        parent: Option<&str>,
        clients: Option<&[Uuid]>,
    ) -> Result<()> {
        check_command(command, payload)?;
        let target = Target { parent, device, channel: None };
        self.send(&target.control(command), payload, clients).await
    }

    pub async fn publish_device_configuration(
        &self,
        device: &str,
        configuration: &Map<String, Value>,
        parent: Option<&str>,
        clients: Option<&[Uuid]>,
    ) -> Result<()> {
        let payload = encode(configuration)?;
        self.publish_device_command(device, ControlName::Configure.as_str(), &payload, parent, clients)
            .await
    }

    pub async fn publish_channel_property(
        &self,
        device: &str,
        channel: &str,
        identifier: &str,
        payload: &str,
        parent: Option<&str>,
        clients: Option<&[Uuid]>,
    ) -> Result<()> {
        let target = Target { parent, device, channel: Some(channel) };
        self.send(&target.property(identifier), payload, clients).await
    }

    pub async fn publish_channel_command(
        &self,
        device: &str,
        channel: &str,
        command: &str,
        payload: &str,
        parent: Option<&str>,
        clients: Option<&[Uuid]>,
    ) -> Result<()> {
        check_command(command, payload)?;
        let target = Target { parent, device, channel: Some(channel) };
        self.send(&target.control(command), payload, clients).await
    }

    pub async fn publish_channel_configuration(
        &self,
        device: &str,
        channel: &str,
        configuration: &Map<String, Value>,
        parent: Option<&str>,
        clients: Option<&[Uuid]>,
    ) -> Result<()> {
        let payload = encode(configuration)?;
        self.publish_channel_command(
            device,
            channel,
            ControlName::Configure.as_str(),
            &payload,
            parent,
            clients,
        )
        .await
    }

    async fn send(&self, topic: &str, payload: &str, clients: Option<&[Uuid]>) -> Result<()> {
        match self.pool.publish(topic, payload.as_bytes(), PUBLISH_QOS, clients).await {
            Ok(()) => {
                info!(topic, "published message");
                Ok(())
            }
            Err(e) => {
                error!(topic, error = %e, "message could not be published");
                Err(e)
            }
        }
    }
}

fn check_command(command: &str, payload: &str) -> Result<()> {
    if command == ControlName::Configure.as_str() && serde_json::from_str::<Value>(payload).is_err() {
        return Err(Error::Validation(format!(
            "invalid payload for command '{command}'"
        )));
    }
    Ok(())
}

fn encode(configuration: &Map<String, Value>) -> Result<String> {
    serde_json::to_string(configuration)
        .map_err(|e| Error::Validation(format!("configuration could not be encoded: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::config::RetryConfig;
    use crate::convention;
    use crate::pool::testing::FakeClient;
    use serde_json::json;

    async fn publisher() -> (ApiV1Publisher, Arc<FakeClient>) {
        let pool = ClientPool::new(RetryConfig::default());
        let client = FakeClient::new();
        client.connect().await.unwrap();
        pool.register(client.clone()).unwrap();
        (ApiV1Publisher::new(Arc::new(pool)), client)
    }

    fn topics(client: &FakeClient) -> Vec<String> {
        client.published.lock().iter().map(|(t, _, _)| t.clone()).collect()
    }

    #[tokio::test]
    async fn test_property_topics() {
        let (publisher, client) = publisher().await;
        publisher
            .publish_device_property("dev", "temp", "21", None, None)
            .await
            .unwrap();
        publisher
            .publish_device_property("dev", "temp", "21", Some("hub"), None)
            .await
            .unwrap();
        publisher
            .publish_channel_property("dev", "ch0", "switch", "on", None, None)
            .await
            .unwrap();
        publisher
            .publish_channel_property("dev", "ch0", "switch", "on", Some("hub"), None)
            .await
            .unwrap();

        let topics = topics(&client);
        assert_eq!(
            topics,
            [
                "/fb/v1/dev/$property/temp/set",
                "/fb/v1/hub/$child/dev/$property/temp/set",
                "/fb/v1/dev/$channel/ch0/$property/switch/set",
                "/fb/v1/hub/$child/dev/$channel/ch0/$property/switch/set",
            ]
        );
        assert!(convention::is_device_property_set(&topics[0]));
        assert!(convention::is_device_property_set(&topics[1]));
        assert!(convention::is_channel_property_set(&topics[2]));
        assert!(convention::is_channel_property_set(&topics[3]));
        assert!(topics.iter().all(|t| !convention::validate(t)));
        assert!(client.published.lock().iter().all(|(_, _, qos)| *qos == QoS::AtLeastOnce));
    }

    #[tokio::test]
    async fn test_commands() {
        let (publisher, client) = publisher().await;
        publisher
            .publish_device_command("dev", "reset", "true", None, None)
            .await
            .unwrap();
        publisher
            .publish_channel_command("dev", "ch0", "reset", "true", Some("hub"), None)
            .await
            .unwrap();

        assert_eq!(
            topics(&client),
            [
                "/fb/v1/dev/$control/reset/set",
                "/fb/v1/hub/$child/dev/$channel/ch0/$control/reset/set",
            ]
        );
    }

    #[tokio::test]
    async fn test_configuration_payload() {
        let (publisher, client) = publisher().await;
        let Value::Object(configuration) = json!({"interval": 30}) else {
            unreachable!()
        };
        publisher
            .publish_device_configuration("dev", &configuration, None, None)
            .await
            .unwrap();
        publisher
            .publish_channel_configuration("dev", "ch0", &configuration, None, None)
            .await
            .unwrap();

        let published = client.published.lock();
        assert_eq!(published[0].0, "/fb/v1/dev/$control/configure/set");
        assert_eq!(published[0].1, br#"{"interval":30}"#);
        assert_eq!(published[1].0, "/fb/v1/dev/$channel/ch0/$control/configure/set");
    }

    #[tokio::test]
    async fn test_invalid_configure_payload() {
        let (publisher, client) = publisher().await;
        let result = publisher
            .publish_device_command("dev", "configure", "{not json", None, None)
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));

        let result = publisher
            .publish_channel_command("dev", "ch0", "configure", "", None, None)
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(client.published.lock().is_empty());
    }

    #[tokio::test]
    async fn test_client_filter() {
        let (publisher, client) = publisher().await;
        let unknown = Uuid::new_v4();
        let result = publisher
            .publish_device_property("dev", "temp", "21", None, Some(&[unknown]))
            .await;
        assert!(matches!(result, Err(Error::ClientNotFound(id)) if id == unknown));

        publisher
            .publish_device_property("dev", "temp", "21", None, Some(&[client.id]))
            .await
            .unwrap();
        assert_eq!(client.published.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnected_client_fails() {
        let (publisher, client) = publisher().await;
        client.disconnect().await.unwrap();
        let result = publisher
            .publish_device_property("dev", "temp", "21", None, None)
            .await;
        assert!(matches!(result, Err(Error::Publish(_))));
    }
}
