//! League Collector
//!
//! Collects the full history of one fantasy league through a browser
//! session and stores it as one JSON record per entity. Rerunning resumes
//! from persisted progress and loads only what is still missing.
//!
//! Exit status: 0 when every target is collected, 1 on a fatal failure or
//! an aborted run, 2 when targets remain pending or the run was cancelled.

use anyhow::{Context, Result};
use clap::Parser;
use league_collector::config::{AutomationBackend, SeasonRange};
use std::path::PathBuf;
use tracing::{error, info};

use collector_service::{initialize_logging, load_configuration, setup_signal_handlers, CollectorService};

#[derive(Debug, Parser)]
#[command(name = "league-collector", version, about = "Collect fantasy league history")]
struct Args {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, env = "LEAGUE_COLLECTOR_CONFIG")]
    config: Option<PathBuf>,

    /// League to collect
    #[arg(short, long)]
    league: Option<String>,

    /// Seasons to collect, bounds inclusive, e.g. `2015..2020`, `2015..=2020`, `2018..` or `2021`
    #[arg(short, long)]
    seasons: Option<String>,

    /// Run each season on its own session
    #[arg(long)]
    sharded: bool,

    /// Maximum concurrent sessions when sharded
    #[arg(long)]
    max_sessions: Option<usize>,

    /// Re-attempt targets that failed for a fatal reason on an earlier run
    #[arg(long)]
    retry_failed: bool,

    /// Fetch server-rendered pages over HTTP instead of driving a browser
    #[arg(long)]
    html: bool,

    /// Data directory for records, progress and the run report
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let code = match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("league-collector: {e:#}");
            1
        }
    };

    std::process::exit(code);
}

#[tokio::main]
async fn run(args: Args) -> Result<i32> {
    let mut config = load_configuration(args.config.as_deref())?;
    apply_args(&mut config, &args)?;

    let _log_guard = initialize_logging(&config.logging)?;
    info!("Starting League Collector v{}", env!("CARGO_PKG_VERSION"));

    let service = CollectorService::new(config)?;
    setup_signal_handlers(service.cancellation_token())?;
    info!("Signal handlers configured");

    let report = service.run().await?;
    Ok(report.exit_code())
}

fn apply_args(config: &mut collector_service::ServiceConfig, args: &Args) -> Result<()> {
    if let Some(league) = &args.league {
        config.collector.league_id = league.clone();
    }
    if let Some(seasons) = &args.seasons {
        config.collector.seasons = SeasonRange::parse(seasons)
            .map_err(anyhow::Error::msg)
            .context("Invalid --seasons")?;
    }
    if args.sharded {
        config.collector.sharding.enabled = true;
    }
    if let Some(max_sessions) = args.max_sessions {
        config.collector.sharding.max_sessions = max_sessions;
    }
    if args.retry_failed {
        config.collector.retry_fatal_failures = true;
    }
    if args.html {
        config.collector.automation.backend = AutomationBackend::Html;
    }
    if let Some(data_dir) = &args.data_dir {
        config.persistence.data_dir = data_dir.clone();
    }
    Ok(())
}
