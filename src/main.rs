//! CLI Entry Point for imu-qa
//!
//! Provides command-line interface for:
//! - Running one QA pass over every discovered unit
//! - Printing the effective configuration
//!
//! # Usage
//!
//! Run against a simulated fleet of three units:
//! ```bash
//! imu-qa run --simulate 3
//! ```
//!
//! Check a configuration file:
//! ```bash
//! imu-qa check-config --config config/imu_qa.toml
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use imu_qa::config::{AppConfig, DEFAULT_CONFIG_PATH};
use imu_qa::discovery::discover;
use imu_qa::hardware::mock::{ImuProfile, SimulatedScanner};
use imu_qa::hardware::Scanner;
use imu_qa::logging;
use imu_qa::orchestrator::{connect_all, QaOrchestrator};
use imu_qa::Verdict;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "imu-qa")]
#[command(about = "Concurrent stability QA for wireless IMU units", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover, connect and run one QA pass
    Run {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Test against N simulated units instead of hardware
        #[arg(long, value_name = "N")]
        simulate: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load, validate and print the effective configuration
    CheckConfig {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            simulate,
            json,
        } => run_pass(config, simulate, json).await,
        Commands::CheckConfig { config } => check_config(config),
    }
}

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_from(path).with_context(|| format!("loading {}", path.display()))
}

fn check_config(path: PathBuf) -> Result<()> {
    let config = load_config(&path)?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

async fn run_pass(path: PathBuf, simulate: Option<usize>, json: bool) -> Result<()> {
    let config = load_config(&path)?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;
    info!(app = %config.application.name, "Starting QA pass");

    let scanner: Box<dyn Scanner> = match simulate {
        Some(count) => Box::new(SimulatedScanner::fleet(count, &ImuProfile::default())),
        None => bail!(
            "no wireless transport is bundled with this build; use --simulate N to run against simulated units"
        ),
    };

    let candidates = discover(scanner.as_ref(), &config.discovery).await?;
    let sessions = connect_all(candidates, &config).await?;
    let orchestrator = QaOrchestrator::new(config.qa.clone(), sessions);

    let abort = orchestrator.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, ending measurement early");
            abort.abort();
        }
    });

    let results = orchestrator.run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!();
        for result in &results {
            println!("{result}");
        }
    }

    let failed = results
        .iter()
        .filter(|r| r.verdict == Verdict::Fail)
        .count();
    info!(devices = results.len(), failed, "QA pass complete");
    Ok(())
}
