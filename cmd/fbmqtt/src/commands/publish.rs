//! Outbound property writes and commands.

use std::time::Duration;

use clap::{Args, Subcommand};
use fb_mqtt_connector::Connector;

use super::{load_config, print_success, print_verbose, wait_connected};
use crate::Cli;
use tracing::debug;

/// Publish a property value or a command to a device.
#[derive(Args)]
pub struct PublishCommand {
    /// Parent device when the target is a child device
    #[arg(long, global = true)]
    parent: Option<String>,

    /// Channel of the device
    #[arg(long, global = true)]
    channel: Option<String>,

    /// Seconds to wait for a broker connection
    #[arg(long, global = true, default_value_t = 10)]
    timeout: u64,

    #[command(subcommand)]
    command: PublishSubcommand,
}

#[derive(Subcommand)]
enum PublishSubcommand {
    /// Set a property value
    Property {
        /// Device identifier
        device: String,
        /// Property identifier
        identifier: String,
        /// Value to set
        payload: String,
    },
    /// Send a control command (configure, reset, reconnect, factory-reset, ota)
    Command {
        /// Device identifier
        device: String,
        /// Control name
        command: String,
        /// Command payload, JSON object for configure
        #[arg(default_value = "true")]
        payload: String,
    },
}

impl PublishCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let config = load_config(cli)?;
        let connector = Connector::from_config(&config)?;
        connector.start()?;

        let result = self.publish(cli, &connector).await;

        connector.stop();
        connector.wait().await;
        result
    }

    async fn publish(&self, cli: &Cli, connector: &Connector) -> anyhow::Result<()> {
        wait_connected(connector, Duration::from_secs(self.timeout)).await?;

        let publisher = connector.publisher();
        debug!(parent = ?self.parent, channel = ?self.channel, "publishing");
        let parent = self.parent.as_deref();
        let channel = self.channel.as_deref();

        match &self.command {
            PublishSubcommand::Property { device, identifier, payload } => {
                print_verbose(cli, &format!("setting {device}/{identifier} to {payload}"));
                match channel {
                    Some(channel) => {
                        publisher
                            .publish_channel_property(device, channel, identifier, payload, parent, None)
                            .await?
                    }
                    None => {
                        publisher
                            .publish_device_property(device, identifier, payload, parent, None)
                            .await?
                    }
                }
                print_success(&format!("property {identifier} of {device} set"));
            }
            PublishSubcommand::Command { device, command, payload } => {
                print_verbose(cli, &format!("sending {command} to {device}"));
                match channel {
                    Some(channel) => {
                        publisher
                            .publish_channel_command(device, channel, command, payload, parent, None)
                            .await?
                    }
                    None => {
                        publisher
                            .publish_device_command(device, command, payload, parent, None)
                            .await?
                    }
                }
                print_success(&format!("command {command} sent to {device}"));
            }
        }
        Ok(())
    }
}
