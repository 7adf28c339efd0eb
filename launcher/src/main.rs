use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use hearth_core::config::Config;
use hearth_core::hub::Hub;

/// Hearth: the home automation Integration Core.
///
/// Loads its configuration, starts the built-in plugins, runs the hub's
/// startup sequence (spec §6) and then blocks until interrupted.
#[derive(Debug, Parser)]
#[command(name = "hearth", version, about)]
struct Cli {
    /// Path to a TOML configuration file. Falls back to built-in defaults
    /// if the file does not exist.
    #[arg(short, long, default_value = "hearth.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let config = Config::load(&cli.config).await?;
    let hub = Arc::new(Hub::new(config).await?);

    hub.load_plugin(Arc::new(hearth_mock_plugin::MockPlugin::new())).await?;

    hub.start().await?;
    log::info!("hearth is running, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    log::info!("shutting down");
    hub.shutdown().await;

    Ok(())
}
