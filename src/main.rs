//! Registrant Portal - eID login brokering and registry API gateway

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use registrant_portal::{cli::Cli, config::Config, gateway::Portal, setup_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            // Apply CLI overrides
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        directory = config.directory.enabled,
        "Starting registrant portal"
    );

    let portal = Portal::new(config);
    if let Err(e) = portal.run().await {
        error!("Portal error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Portal shutdown complete");
    ExitCode::SUCCESS
}
