//! License Manager Server Entry Point

use clap::Parser;
use license_manager_server::cli::Cli;
use license_manager_server::{config, logging, server};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match config::load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let guard = match logging::init(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        address = %config.http_server.address,
        "Starting license manager"
    );

    let result = server::run(config).await;
    if let Err(e) = result {
        tracing::error!("{}", e);
        eprintln!("Error: {}", e);
        drop(guard);
        std::process::exit(1);
    }
}
