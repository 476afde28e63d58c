//! CLIインターフェース

use clap::Parser;
use std::path::PathBuf;

/// License Manager - license key issuing and HWID-bound validation server
#[derive(Parser, Debug, Clone)]
#[command(name = "license-manager")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"ENVIRONMENT VARIABLES:
    LICENSE_MANAGER_STORAGE_PATH  SQLite database path (default: storage/licenses.db)
    LICENSE_MANAGER_ADDRESS       Bind address (default: localhost:8080)
    LICENSE_MANAGER_API_KEY       Admin API key (required)
    LICENSE_MANAGER_LOG_DIR       Log directory (default: logs)
    RUST_LOG                      Log filter (default: info)
"#)]
pub struct Cli {
    /// YAML config file
    #[arg(long, default_value = "config/local.yaml")]
    pub config: PathBuf,

    /// dotenv file applied before reading the environment
    #[arg(long, default_value = "config/local.env")]
    pub env_file: PathBuf,

    /// Bind address (overrides config and environment)
    #[arg(long)]
    pub address: Option<String>,
}
