//! Offline topic validation and payload parsing.

use clap::Args;
use fb_mqtt_connector::{convention, parse_message, Entity};
use serde::Serialize;

use super::{output_result, print_error};
use crate::Cli;

/// Validate a topic and parse a payload without a broker.
#[derive(Args)]
pub struct CheckCommand {
    /// Topic, e.g. /fb/v1/device-1/$property/temp/$unit
    topic: String,
    /// Payload to parse
    #[arg(default_value = "")]
    payload: String,
    /// Treat the message as retained
    #[arg(long)]
    retained: bool,
}

#[derive(Serialize)]
struct Report {
    topic: String,
    valid: bool,
    command: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    shape: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity: Option<Entity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CheckCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let topic = self.topic.as_str();
        let mut report = Report {
            topic: topic.to_string(),
            valid: convention::validate(topic),
            command: convention::is_command(topic),
            shape: convention::classify(topic).map(|s| format!("{s:?}")),
            entity: None,
            error: None,
        };

        match parse_message(topic, &self.payload, self.retained) {
            Ok(entity) => report.entity = Some(entity),
            Err(e) => report.error = Some(e.to_string()),
        }

        output_result(&report, cli.json)?;
        if let Some(error) = &report.error {
            print_error(error);
            anyhow::bail!("message rejected");
        }
        Ok(())
    }
}
