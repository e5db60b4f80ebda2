//! switchmgrd entry point.
//!
//! Loads the desired configuration and the tracked state, then runs one of
//! `plan`, `apply`, `refresh` or `destroy` against the local Open vSwitch.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ovs_switchmgrd::config::DEFAULT_CONFIG_PATH;
use ovs_switchmgrd::state::DEFAULT_STATE_PATH;
use ovs_switchmgrd::{
    current_user, plan, Orchestrator, OvsClient, StateStore, SwitchConfig, TrackedState,
};

/// Open vSwitch bridge and port configuration manager
#[derive(Parser, Debug)]
#[command(name = "switchmgrd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Desired configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    /// Tracked state file
    #[arg(short = 's', long, default_value = DEFAULT_STATE_PATH, global = true)]
    state: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info", global = true)]
    log_level: String,

    /// Run commands without sudo, overriding the configuration file
    #[arg(long, global = true)]
    no_sudo: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the changes apply would make
    Plan,
    /// Converge the switch with the configuration
    Apply,
    /// Drop tracked resources that no longer exist
    Refresh,
    /// Delete every tracked resource
    Destroy,
}

/// Initialize tracing/logging.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Loads the configuration file; `refresh` and `destroy` fall back to
/// defaults when it is missing.
fn load_config(args: &Args) -> Result<SwitchConfig> {
    let required = matches!(args.command, Command::Plan | Command::Apply);
    if !required && !args.config.exists() {
        info!(
            "No configuration at {}, using client defaults",
            args.config.display()
        );
        return Ok(SwitchConfig::default());
    }
    SwitchConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;

    let mut options = config
        .client
        .to_options()
        .context("Invalid [client] section")?;
    if args.no_sudo {
        options.sudo = false;
    }
    let tap_owner = match &config.client.tap_owner {
        Some(owner) => owner.clone(),
        None => current_user().context("Failed to resolve tap owner")?,
    };

    let client = Arc::new(OvsClient::new(options));
    let store = StateStore::new(&args.state);
    let orchestrator = Orchestrator::new(client.clone(), client, tap_owner);
    // Plan refreshes a copy of the state and never writes the file back.
    let orchestrator = match args.command {
        Command::Plan => orchestrator,
        _ => orchestrator.with_store(store.clone()),
    };

    let mut state: TrackedState = store
        .load()
        .with_context(|| format!("Failed to load {}", args.state.display()))?;

    match args.command {
        Command::Plan => {
            let desired = config.desired_state().context("Invalid configuration")?;
            orchestrator.refresh(&mut state).await?;
            print!("{}", plan(&state, &desired));
        }
        Command::Apply => {
            let desired = config.desired_state().context("Invalid configuration")?;
            let plan = orchestrator.converge(&mut state, &desired).await?;
            print!("{}", plan);
        }
        Command::Refresh => {
            let report = orchestrator.refresh(&mut state).await?;
            for id in &report.dropped {
                println!("- {}", id);
            }
            println!(
                "{} checked, {} no longer present.",
                report.checked,
                report.dropped.len()
            );
        }
        Command::Destroy => {
            let deleted = orchestrator.destroy(&mut state).await?;
            println!("{} resource(s) destroyed.", deleted);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("switchmgrd: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("--- Starting switchmgrd ---");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("switchmgrd error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
