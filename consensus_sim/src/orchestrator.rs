//! Top-level driver of a simulation run.

use crate::cluster::{data_subdir, ClusterBuilder, ClusterConfig};
use crate::config::SimulationConfig;
use crate::error::{Result, SimError};
use crate::lock::DirLock;
use crate::metrics::HeightProbe;
use crate::monitor::{RunOutcome, SimulationMonitor};
use crate::node::{Node, NodeRole};
use crate::ports::PortAllocator;

use consensus_env::{ProcessLauncher, SimClock, ValidatorId};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Final state of one node after the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeReport {
    pub validator_id: ValidatorId,
    pub role: NodeRole,
    pub height: Option<u64>,
    pub log_file: PathBuf,
}

/// Summary of a completed (non-fatal) simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub elapsed_secs: f64,
    pub db_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub nodes: Vec<NodeReport>,
}

/// Validates inputs, owns the directory lock and runs the monitor.
pub struct Orchestrator {
    config: SimulationConfig,
    clock: Arc<dyn SimClock>,
    launcher: Arc<dyn ProcessLauncher>,
    probe: Arc<dyn HeightProbe>,
    ports: Box<dyn PortAllocator + Send>,
}

impl Orchestrator {
    pub fn new(
        config: SimulationConfig,
        clock: Arc<dyn SimClock>,
        launcher: Arc<dyn ProcessLauncher>,
        probe: Arc<dyn HeightProbe>,
        ports: Box<dyn PortAllocator + Send>,
    ) -> Self {
        Self {
            config,
            clock,
            launcher,
            probe,
            ports,
        }
    }

    /// Executes the whole run.
    ///
    /// Input errors abort before the lock is taken; from then on the lock is
    /// held until every started node has been stopped.
    pub async fn run<I>(mut self, interrupt: I) -> Result<RunReport>
    where
        I: Future<Output = ()>,
    {
        let run_id = Uuid::new_v4();
        self.config.validate()?;
        let n = self.config.num_validators;

        if let Some(db_dir) = &self.config.db_dir {
            verify_data_dirs(db_dir, n)?;
        }

        let logs_dir = match &self.config.logs_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| SimError::io(dir, e))?;
                dir.clone()
            }
            None => create_logs_dir()?,
        };

        let db_dir = match &self.config.db_dir {
            Some(dir) => dir.clone(),
            None => {
                create_data_dirs(&logs_dir, n)?;
                logs_dir.clone()
            }
        };

        let lock = DirLock::acquire(&db_dir)?;
        info!("Simulation {} holds {}", run_id, lock.lock_file().display());

        if let Some(build) = &self.config.build_command {
            run_build_step(build).await?;
        }

        info!("DB files will be stored in: {}", db_dir.display());
        info!("Logs will be stored in: {}", logs_dir.display());

        let cluster = ClusterConfig {
            node_binary: self.config.node_binary.clone(),
            base_layer_node_url: self.config.base_layer_node_url.clone(),
            num_validators: n,
            data_dir: db_dir.clone(),
            logs_dir: logs_dir.clone(),
            bootstrap_port: self.ports.allocate()?,
            identity: self.config.bootstrap_identity()?,
            collect_metrics: self.config.collect_metrics,
        };
        let specs = ClusterBuilder::new(&cluster, self.ports.as_mut()).build()?;
        let mut nodes: Vec<Node> = specs.into_iter().map(Node::new).collect();

        info!("Running validators...");
        let started = self.clock.now();
        let mut monitor = SimulationMonitor::new(
            self.clock.clone(),
            self.launcher.clone(),
            self.probe.clone(),
            self.config.monitor_settings(),
        );
        let outcome = monitor.run(&mut nodes, interrupt).await;
        let elapsed = self.clock.now().saturating_sub(started);

        // Every node has been stopped by now.
        if let Err(e) = lock.release() {
            warn!("{}", e);
        }

        let outcome = outcome?;
        info!("DB files were stored in: {}", db_dir.display());
        info!("Logs were stored in: {}", logs_dir.display());
        info!("Simulation complete.");

        Ok(RunReport {
            run_id,
            outcome,
            elapsed_secs: elapsed.as_secs_f64(),
            db_dir,
            logs_dir,
            nodes: nodes
                .iter()
                .map(|node| NodeReport {
                    validator_id: node.validator_id(),
                    role: node.spec().role,
                    height: node.liveness().height,
                    log_file: node.spec().log_file.clone(),
                })
                .collect(),
        })
    }
}

/// Checks that `db_dir` holds a `data{i}` directory for every validator.
pub fn verify_data_dirs(db_dir: &Path, num_validators: usize) -> Result<()> {
    let entries = std::fs::read_dir(db_dir).map_err(|e| SimError::io(db_dir, e))?;
    let present: HashSet<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();

    let missing: Vec<String> = (0..num_validators as u64)
        .map(|i| format!("data{}", i))
        .filter(|name| !present.contains(name))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SimError::MissingDataDirs {
            db_dir: db_dir.to_path_buf(),
            missing,
        })
    }
}

fn create_logs_dir() -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix("consensus-sim-")
        .tempdir()
        .map_err(|e| SimError::io(std::env::temp_dir(), e))?;
    Ok(dir.keep())
}

fn create_data_dirs(root: &Path, num_validators: usize) -> Result<()> {
    for i in 0..num_validators as u64 {
        let dir = data_subdir(root, ValidatorId(i));
        std::fs::create_dir_all(&dir).map_err(|e| SimError::io(&dir, e))?;
    }
    Ok(())
}

/// Runs the node build command and fails unless it exits successfully.
async fn run_build_step(command: &[String]) -> Result<()> {
    let rendered = command.join(" ");
    let Some((program, args)) = command.split_first() else {
        return Err(SimError::config("build command must not be empty"));
    };

    info!("Running {}...", rendered);
    let status = tokio::process::Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|e| SimError::BuildFailed {
            command: rendered.clone(),
            reason: e.to_string(),
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(SimError::BuildFailed {
            command: rendered,
            reason: status.to_string(),
        })
    }
}
