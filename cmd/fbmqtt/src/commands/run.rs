//! Runs the connector until Ctrl-C.

use std::sync::Arc;

use clap::Args;
use fb_mqtt_connector::{Connector, Consumer, Entity, Result};
use tracing::{debug, info};

use super::{load_config, print_info, print_success};
use crate::Cli;

/// Run the connector and print every received entity.
#[derive(Args)]
pub struct RunCommand {
    /// Only print entities of this device
    #[arg(long)]
    device: Option<String>,
}

/// Writes every entity to stdout, one JSON document per line.
struct PrintConsumer {
    device: Option<String>,
}

impl Consumer for PrintConsumer {
    fn consume(&self, entity: &Entity) -> Result<()> {
        if self.device.as_deref().is_some_and(|d| d != entity.device()) {
            debug!(kind = entity.kind(), device = entity.device(), "entity filtered out");
            return Ok(());
        }
        let line = serde_json::to_string(entity)
            .map_err(|e| fb_mqtt_connector::Error::Consumer(e.to_string()))?;
        println!("{line}");
        Ok(())
    }
}

impl RunCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let config = load_config(cli)?;
        let connector = Connector::from_config(&config)?;
        info!(
            clients = config.clients.len(),
            queue_capacity = config.queue_capacity,
            "connector configured"
        );
        connector.register_consumer(Arc::new(PrintConsumer {
            device: self.device.clone(),
        }));

        connector.start()?;
        print_info(&format!(
            "connector running with {} client(s), press Ctrl-C to stop",
            connector.pool().len()
        ));

        tokio::signal::ctrl_c().await?;
        info!(queued = connector.queue().len(), "interrupt received");
        print_info("stopping, draining queued messages");
        connector.stop();
        connector.wait().await;
        print_success("connector stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fb_mqtt_connector::parse_message;

    #[test]
    fn test_device_filter() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let consumer = PrintConsumer {
            device: Some("lamp".into()),
        };
        let other = parse_message("/fb/v1/sensor/$state", "ready", false).unwrap();
        let own = parse_message("/fb/v1/lamp/$name", "Lamp", false).unwrap();
        assert!(consumer.consume(&other).is_ok());
        assert!(consumer.consume(&own).is_ok());
    }
}
