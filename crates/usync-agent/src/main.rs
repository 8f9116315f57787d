//! User snapshot sync agent - Entry Point

use anyhow::Result;
use clap::Parser;
use tracing::info;
use usync_agent::config::{self, AppConfig};

/// Keeps the signed-in account's snapshot in sync with the server
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via USYNC_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config first: it carries the logging settings
    let config = AppConfig::load(args.config.as_deref())?;
    usync_telemetry::init_logging_with(&config.telemetry)?;

    info!("Starting usync-agent v{}", env!("CARGO_PKG_VERSION"));
    info!(
        ws_url = %config.ws_url,
        profile_url = %config.profile_url,
        poll_interval_ms = config.sync.poll_interval_ms,
        "Configuration loaded"
    );

    let credentials = config::credentials_from_env()?;
    if credentials.is_none() {
        info!("No credentials in environment, waiting logged out");
    }

    let app = usync_agent::Application::new(config)?;
    app.run(credentials).await?;

    Ok(())
}
