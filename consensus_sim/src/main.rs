//! Consensus cluster simulator CLI
//!
//! Runs a local validator cluster and watches it for liveness.

use clap::Parser;
use consensus_env::{TokioClock, TokioLauncher};
use consensus_sim::monitor::{
    DEFAULT_MONITORING_PERIOD, DEFAULT_STAGNATION_TIMEOUT, DEFAULT_STOP_GRACE,
};
use consensus_sim::{
    HttpHeightProbe, Orchestrator, OsPortAllocator, RunReport, SimError, SimulationConfig,
    MIN_VALIDATORS,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// How long a single metrics request may take.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "consensus-sim")]
#[command(about = "Run a local consensus cluster and monitor its liveness")]
struct Args {
    /// L1 node URL shared by every validator
    #[arg(long)]
    base_layer_node_url: String,

    /// Number of validators in the cluster
    #[arg(long, value_parser = clap::value_parser!(u64).range(MIN_VALIDATORS as u64..))]
    num_validators: u64,

    /// Existing directory containing data0..data{N-1} to reuse
    #[arg(long)]
    db_dir: Option<PathBuf>,

    /// Seconds a node's height may remain unchanged
    #[arg(long, default_value_t = DEFAULT_STAGNATION_TIMEOUT.as_secs())]
    stagnation_threshold: u64,

    /// Total run length in seconds (runs until interrupted if omitted)
    #[arg(long)]
    duration: Option<u64>,

    /// Seconds between height checks
    #[arg(long, default_value_t = DEFAULT_MONITORING_PERIOD.as_secs())]
    monitoring_period: u64,

    /// Seconds a node gets to exit after SIGINT before it is killed
    #[arg(long, default_value_t = DEFAULT_STOP_GRACE.as_secs())]
    stop_grace: u64,

    /// Node binary to launch
    #[arg(long, default_value = consensus_sim::config::DEFAULT_NODE_BINARY)]
    node_binary: PathBuf,

    /// Do not build the node binary before launching
    #[arg(long)]
    skip_build: bool,

    /// Derive a fresh bootstrap identity from this seed
    #[arg(long)]
    bootstrap_seed: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON report for CI parsing
    #[arg(long)]
    json: bool,
}

impl Args {
    fn into_config(self) -> SimulationConfig {
        let num_validators = self.num_validators as usize;
        let mut config = SimulationConfig::new(self.base_layer_node_url, num_validators)
            .with_stagnation_threshold(self.stagnation_threshold)
            .with_monitoring_period(self.monitoring_period)
            .with_stop_grace(self.stop_grace)
            .with_node_binary(self.node_binary);

        if let Some(dir) = self.db_dir {
            config = config.with_db_dir(dir);
        }
        if let Some(secs) = self.duration {
            config = config.with_duration(secs);
        }
        if let Some(seed) = self.bootstrap_seed {
            config = config.with_bootstrap_seed(seed);
        }
        if self.skip_build {
            config = config.with_build_command(None);
        }
        config
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let json = args.json;
    let config = args.into_config();

    match simulate(config).await {
        Ok(report) => {
            print_report(&report, json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn simulate(config: SimulationConfig) -> Result<RunReport, SimError> {
    let probe = HttpHeightProbe::new(&config.height_metric, PROBE_TIMEOUT);
    let orchestrator = Orchestrator::new(
        config,
        Arc::new(TokioClock::new()),
        Arc::new(TokioLauncher::new()),
        Arc::new(probe),
        Box::new(OsPortAllocator),
    );

    orchestrator
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}

fn print_report(report: &RunReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(out) => println!("{}", out),
            Err(e) => error!("Failed to serialize report: {}", e),
        }
        return;
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!(
        "Run {} finished after {:.1}s: {:?}",
        report.run_id, report.elapsed_secs, report.outcome
    );
    for node in &report.nodes {
        match node.height {
            Some(height) => info!("  {} {}: height {}", node.role, node.validator_id, height),
            None => info!("  {} {}: height unknown", node.role, node.validator_id),
        }
    }
}
