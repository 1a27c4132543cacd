use anyhow::Result;
use clap::Parser;

use rattle_daemon::orchestrator::{Orchestrator, load_config};

mod cli;
mod logging;

use cli::DaemonCli;
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = load_config(&cli.config).await?;
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
    if cli.validate {
        println!("configuration is valid: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(
        &config.general.log_level,
        LogFormat::from_name(&config.general.log_format),
    )?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.general.environment,
        "rattle-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config)?;
    orchestrator.run().await
}
