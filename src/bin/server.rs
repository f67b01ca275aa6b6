use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use realtime_sync::config::SyncConfig;
use realtime_sync::error::Result;
use realtime_sync::server::Server;
use realtime_sync::utils::logging::init_logging;

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time item sync server", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, env = "REALTIME_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration
    #[arg(long)]
    listen: Option<String>,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", SyncConfig::example_config());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => SyncConfig::from_file(path)?,
        None => SyncConfig::default(),
    };
    config.apply_env();
    if let Some(listen) = cli.listen {
        config.server.address = listen;
    }

    init_logging(&config.logging);
    config.validate_strict()?;

    let server = Server::bind(config.server).await?;
    info!(address = %server.local_addr()?, "Item server ready");

    if let Err(e) = server.run_until_ctrl_c().await {
        error!(error = %e, "Server exited with error");
        return Err(e);
    }
    Ok(())
}
