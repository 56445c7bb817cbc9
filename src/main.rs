mod bootstrap;
mod config;
mod distribution;
mod error;
mod gateway;
mod inspection;
mod records;
mod retry;
mod roster;

use clap::{Args, Parser, Subcommand};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;
use crate::distribution::{supervise, DistributionService, RestartPolicy, RunHandle, RunSummary};
use crate::error::AppResult;
use crate::inspection::{render_table, ScheduleInspector};

#[derive(Parser, Debug)]
#[command(name = "distributor", version, about = "Batch vesting schedule distribution")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Cohort number substituted into the file templates
    #[arg(long, env = "VESTING_ITERATION")]
    iteration: Option<u32>,

    /// Config file (defaults to ./distribution.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create vesting schedules for every roster beneficiary that lacks one
    Distribute {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Print the on-chain schedule of every address in a roster
    Verify {
        #[command(flatten)]
        common: CommonArgs,

        /// Address list to check (defaults to the iteration's roster)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    fn common(&self) -> &CommonArgs {
        match self {
            Command::Distribute { common } | Command::Verify { common, .. } => common,
        }
    }
}

// Console and persistent log sinks
fn init_tracing(log_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let log_file = OpenOptions::new().create(true).append(true).open(log_path)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .init();

    Ok(())
}

/// Supervised run under a fresh handle
async fn run_supervised(
    service: &DistributionService,
    policy: RestartPolicy,
) -> AppResult<RunSummary> {
    let handle = RunHandle::new();
    supervise(policy, || service.run(&handle)).await
}

async fn distribute(config: &AppConfig) -> anyhow::Result<()> {
    info!("🚀 Starting vesting distribution (iteration {})", config.iteration);

    let service = bootstrap::initialize_distribution(config).await?;

    tokio::select! {
        result = run_supervised(&service, config.restart_policy()) => {
            let summary = result?;
            info!("🏁 Distribution complete: {}", serde_json::to_string(&summary)?);
        }
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("🛑 Interrupt received, exiting without waiting for the in-flight batch");
        }
    }

    Ok(())
}

/// Inspect every address and render the reports. Per-address failures are
/// rows in the output, not errors.
async fn render_verification(
    inspector: &ScheduleInspector,
    addresses: &[String],
    json: bool,
) -> anyhow::Result<String> {
    let reports = inspector.inspect_all(addresses).await;
    if json {
        Ok(format!("{}\n", serde_json::to_string_pretty(&reports)?))
    } else {
        Ok(render_table(&reports))
    }
}

async fn verify(config: &AppConfig, input: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let path = input.unwrap_or_else(|| config.roster_path());
    info!("🔍 Verifying schedules for {}", path.display());

    let addresses = roster::load_addresses(&path)?;
    let inspector = bootstrap::initialize_inspector(config)?;
    print!("{}", render_verification(&inspector, &addresses, json).await?);

    Ok(())
}

/// Process exit status for a finished command: 0 on success, 1 otherwise
fn exit_status<T>(result: &anyhow::Result<T>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(e) => {
            error!("❌ {:#}", e);
            1
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let common = cli.command.common().clone();
    let config = match AppConfig::load(common.config.as_deref(), common.iteration) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_tracing(&config.log_path()) {
        eprintln!("❌ Failed to open log file {}: {}", config.log_path().display(), e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Distribute { .. } => distribute(&config).await,
        Command::Verify { input, json, .. } => verify(&config, input, json).await,
    };

    ExitCode::from(exit_status(&result))
}
