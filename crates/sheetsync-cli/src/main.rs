//! sheetsync CLI
//!
//! Command-line trigger for the sheetsync engine: pull a tenant's sheet into
//! the store, push records back, and inspect sync status.

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sheetsync_core::{Config, SpreadsheetReader, Store, SyncEngine, TenantId, TenantRegistry};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "sheetsync")]
#[command(about = "sheetsync - Mirror tenant spreadsheets into a relational store")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull a tenant's sheet into the store
    Pull {
        #[command(flatten)]
        target: Target,
    },
    /// Push a tenant's records back into its sheet
    Push {
        #[command(flatten)]
        target: Target,
    },
    /// Show the last sync run and record count of a tenant
    Status {
        /// Tenant id
        #[arg(short, long)]
        tenant: TenantId,
        /// Number of runs to show
        #[arg(short = 'n', long, default_value_t = 1)]
        runs: usize,
    },
    /// List configured tenants
    Tenants,
    /// Show configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Pull every auto-sync tenant periodically until Ctrl-C
    Watch {
        /// Seconds between rounds (defaults to auto_sync_interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },
}

/// Which tenant and sheet a pull or push targets
#[derive(clap::Args, Clone)]
pub struct Target {
    /// Tenant id
    #[arg(short, long)]
    pub tenant: TenantId,
    /// Spreadsheet id or URL (defaults to the tenant's configured sheet)
    #[arg(short, long)]
    pub spreadsheet: Option<String>,
    /// Tab name (defaults to the tenant's configured tab)
    #[arg(long)]
    pub tab: Option<String>,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    match run(cli, &output).await {
        Ok(code) => code,
        Err(e) => {
            output.error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, output: &Output) -> Result<ExitCode> {
    let config = Config::load_with_cli_override(cli.config.as_deref())
        .context("Failed to load configuration")?;
    init_logging(&config, cli.verbose);

    // Commands that don't need the store
    match &cli.command {
        Commands::Config { command } => {
            return match command {
                Some(ConfigCommands::Show) | None => {
                    commands::config::show(&config, cli.config.as_deref(), output)
                }
            }
            .map(|_| ExitCode::SUCCESS);
        }
        Commands::Tenants => {
            let registry = load_registry(&config)?;
            commands::tenants::list(&registry, output);
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let registry = Arc::new(load_registry(&config)?);
    let store = Arc::new(Store::open(&config)?);

    if let Commands::Status { tenant, runs } = &cli.command {
        commands::status::show(&store, &registry, *tenant, *runs, output)?;
        return Ok(ExitCode::SUCCESS);
    }

    let reader = SpreadsheetReader::from_config(&config)?;
    let engine = Arc::new(SyncEngine::new(store, reader, registry.clone()));

    match cli.command {
        Commands::Pull { target } => Ok(commands::sync::pull(&engine, &target, output).await),
        Commands::Push { target } => Ok(commands::sync::push(&engine, &target, output).await),
        Commands::Watch { interval } => {
            let secs = interval.unwrap_or(config.auto_sync_interval_secs);
            commands::watch::run(engine, registry, secs, output).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status { .. } | Commands::Tenants | Commands::Config { .. } => {
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_registry(config: &Config) -> Result<TenantRegistry> {
    TenantRegistry::load(&config.tenants_file).with_context(|| {
        format!(
            "Failed to load tenants from {:?} (set tenants_file or SHEETSYNC_TENANTS_FILE)",
            config.tenants_file
        )
    })
}

/// Initialize logging
///
/// `RUST_LOG` wins when set; otherwise info (debug with `-v`) for our crates.
/// Logs go to `config.log_file` when configured, stderr otherwise.
fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("sheetsync_core={},sheetsync_cli={}", level, level))
    });

    if let Some(ref log_path) = config.log_file {
        match File::create(log_path) {
            Ok(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(env_filter)
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(file)
                    .try_init();
                return;
            }
            Err(e) => {
                eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
            }
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
