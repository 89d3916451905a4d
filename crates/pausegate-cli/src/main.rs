mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pausegate_core::config::default_config_path;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pausegate")]
#[command(about = "Pause before opening the apps you overuse", long_about = None)]
struct Cli {
    /// Database file (defaults to the local data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Engine configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the engine against JSON-lines signals on stdin
    Run,
    /// Manage monitored apps
    Apps {
        #[command(subcommand)]
        action: AppsAction,
    },
    /// Show persisted engine state
    Status,
    /// Show pauses the user accepted
    Rewards {
        /// How many days of history to show
        #[arg(short, long, default_value = "7")]
        days: u32,
    },
    /// Forget timing and force-pause state for an app
    Reset { package: String },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum AppsAction {
    /// List monitored apps
    List,
    /// Start monitoring an app (or update it)
    Add {
        package: String,
        /// Name shown in listings
        #[arg(short, long)]
        name: Option<String>,
        /// Periodic pause interval in seconds (0 = off)
        #[arg(short, long, default_value = "0")]
        interval: u32,
    },
    /// Stop monitoring an app
    Remove { package: String },
    Enable { package: String },
    Disable { package: String },
    /// Set the periodic pause interval in seconds (0 = off)
    Interval { package: String, seconds: u32 },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file location
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout belongs to the host bridge; logs go to stderr
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .target(env_logger::Target::Stderr)
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let db_path = cli.db;

    match cli.command {
        Commands::Run => commands::bridge::run_bridge(db_path, &config_path).await,
        Commands::Apps { action } => match action {
            AppsAction::List => commands::apps::handle_apps_list(db_path),
            AppsAction::Add {
                package,
                name,
                interval,
            } => commands::apps::handle_apps_add(db_path, &package, name, interval),
            AppsAction::Remove { package } => commands::apps::handle_apps_remove(db_path, &package),
            AppsAction::Enable { package } => {
                commands::apps::handle_apps_enable(db_path, &package, true)
            }
            AppsAction::Disable { package } => {
                commands::apps::handle_apps_enable(db_path, &package, false)
            }
            AppsAction::Interval { package, seconds } => {
                commands::apps::handle_apps_interval(db_path, &package, seconds)
            }
        },
        Commands::Status => commands::status::handle_status(db_path),
        Commands::Rewards { days } => commands::rewards::handle_rewards(db_path, days),
        Commands::Reset { package } => commands::status::handle_reset(db_path, &package),
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::handle_config_show(&config_path),
            ConfigAction::Path => {
                commands::config::handle_config_path(&config_path);
                Ok(())
            }
        },
    }
}
