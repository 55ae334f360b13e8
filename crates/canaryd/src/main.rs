//! canaryd — the canary rollout controller daemon.
//!
//! Single binary that assembles:
//! - Object store (redb)
//! - Desired-state change feed
//! - Canary controller
//! - REST API
//!
//! # Usage
//!
//! ```text
//! canaryd run --port 8480 --data-dir /var/lib/canaryd --config canaryd.toml
//! canaryd config --config canaryd.toml
//! ```

mod daemon;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use canary_core::CanarydConfig;

const DEFAULT_LOG_FILTER: &str = "info,canaryd=debug,canary=debug";

#[derive(Parser)]
#[command(name = "canaryd", about = "Canary rollout controller daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller and the REST API.
    Run {
        /// Port to listen on. Overrides `[api] port`.
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state. Without it the store is
        /// kept in memory and lost on exit.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Path to canaryd.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Only reconcile canary deploys in this namespace. Overrides
        /// `[controller] namespace`.
        #[arg(long)]
        namespace: Option<String>,
    },

    /// Print the effective configuration as TOML.
    Config {
        /// Path to canaryd.toml.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<CanarydConfig> {
    match path {
        Some(path) => CanarydConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("load config {}: {e}", path.display())),
        None => Ok(CanarydConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run {
            port,
            data_dir,
            config,
            namespace,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(port) = port {
                config.api.get_or_insert_with(Default::default).port = Some(port);
            }
            if namespace.is_some() {
                config
                    .controller
                    .get_or_insert_with(Default::default)
                    .namespace = namespace;
            }
            daemon::run_daemon(config, data_dir).await
        }
        Command::Config { config } => {
            let config = load_config(config.as_ref())?;
            print!("{}", config.resolved().to_toml_string()?);
            Ok(())
        }
    }
}
