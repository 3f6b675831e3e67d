//! Ripple CLI - ripple command

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod cmd;
mod logging;
mod system_config;

/// Ripple - Debounced realtime change notifications
#[derive(Parser)]
#[command(name = "ripple")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/ripple/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a synthetic burst of row changes through a debounced channel
    Simulate(SimulateArgs),
    /// View and edit configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ScopeArg {
    Workspace,
    Entity,
    Global,
}

#[derive(clap::Args, Debug)]
pub struct SimulateArgs {
    /// Scope of the simulated channel
    #[arg(long, value_enum, default_value = "workspace")]
    pub scope: ScopeArg,

    /// Workspace or entity id (ignored for global scope)
    #[arg(long, default_value = "demo")]
    pub scope_id: String,

    /// Foreign key column for entity scope
    #[arg(long, default_value = "entity_id")]
    pub foreign_key: String,

    /// Tables to subscribe to, comma separated
    #[arg(long, value_delimiter = ',', default_value = "items")]
    pub tables: Vec<String>,

    /// Channel name prefix
    #[arg(long, default_value = "sim")]
    pub prefix: String,

    /// Number of row changes to emit
    #[arg(long, default_value = "20")]
    pub events: usize,

    /// Delay between row changes
    #[arg(long, default_value = "100")]
    pub interval_ms: u64,

    /// Override the scope's default debounce
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    /// Bound the delay between refreshes during a continuous burst
    #[arg(long)]
    pub max_wait_ms: Option<u64>,

    /// Refresh on the first event after an idle period
    #[arg(long)]
    pub leading: bool,

    /// Disable the trailing refresh
    #[arg(long)]
    pub no_trailing: bool,

    /// Print a JSON document instead of a report
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// List all configuration values
    List,
    /// Get a single value (e.g. defaults.entity_debounce_ms)
    Get {
        key: String,
    },
    /// Set a single value
    Set {
        key: String,
        value: String,
    },
    /// Show the config file path
    Path {
        /// Create the file with defaults if it does not exist
        #[arg(long)]
        create: bool,
    },
    /// Print an example configuration
    Example,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose, cli.log_file.as_deref())?;

    let config_path = system_config::config_file_path(cli.config.as_deref())?;

    match cli.command {
        Commands::Simulate(args) => cmd::simulate::run(&config_path, args).await,
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::List => cmd::config::run_list(&config_path),
            ConfigCommands::Get { key } => cmd::config::run_get(&config_path, &key),
            ConfigCommands::Set { key, value } => cmd::config::run_set(&config_path, &key, &value),
            ConfigCommands::Path { create } => cmd::config::run_path(&config_path, create),
            ConfigCommands::Example => cmd::config::run_example(),
        },
    }
}
