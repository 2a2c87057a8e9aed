use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::info;

use parley_server::{server, telemetry, Cli, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::from_env()?.with_cli(&cli);

    telemetry::init(config.log_format).map_err(|e| anyhow!(e))?;

    info!("Parley Server starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    config.log_config();

    server::start(config).await?;

    Ok(())
}
