//! Utility functions for CLI commands.

use std::time::Duration;

use fb_mqtt_connector::{ClientState, Connector, ConnectorConfig};
use tracing_subscriber::EnvFilter;

use crate::Cli;

/// Installs the fmt subscriber. `RUST_LOG` wins over the verbose flag.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Loads the connector configuration named by `--config`.
pub fn load_config(cli: &Cli) -> anyhow::Result<ConnectorConfig> {
    let config = ConnectorConfig::from_file(&cli.config)
        .map_err(|e| anyhow::anyhow!("failed to load config '{}': {e}", cli.config))?;
    if config.clients.is_empty() {
        anyhow::bail!("config '{}' has no clients", cli.config);
    }
    print_verbose(cli, &format!("loaded {} client(s) from {}", config.clients.len(), cli.config));
    Ok(config)
}

/// Waits until at least one client of the connector is connected.
pub async fn wait_connected(connector: &Connector, timeout: Duration) -> anyhow::Result<()> {
    let pool = connector.pool();
    let connected = tokio::time::timeout(timeout, async {
        loop {
            let any = pool
                .client_ids()
                .into_iter()
                .any(|id| pool.state(id) == Some(ClientState::Connected));
            if any {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;

    connected.map_err(|_| anyhow::anyhow!("no client connected within {timeout:?}"))
}

/// Outputs result as JSON or YAML.
pub fn output_result<T: serde::Serialize>(result: &T, as_json: bool) -> anyhow::Result<()> {
    let output = if as_json {
        serde_json::to_string_pretty(result)? + "\n"
    } else {
        serde_yaml::to_string(result)?
    };
    print!("{}", output);
    Ok(())
}

/// Prints verbose output if enabled.
pub fn print_verbose(cli: &Cli, msg: &str) {
    if cli.verbose {
        eprintln!("[verbose] {}", msg);
    }
}

/// Prints success message.
pub fn print_success(msg: &str) {
    eprintln!("\x1b[32m✓\x1b[0m {}", msg);
}

/// Prints error message.
pub fn print_error(msg: &str) {
    eprintln!("\x1b[31m✗\x1b[0m {}", msg);
}

/// Prints info message.
pub fn print_info(msg: &str) {
    eprintln!("\x1b[34mℹ\x1b[0m {}", msg);
}
