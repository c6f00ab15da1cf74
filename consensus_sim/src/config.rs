//! Simulation run configuration.

use crate::cluster::MIN_VALIDATORS;
use crate::error::{Result, SimError};
use crate::identity::BootstrapIdentity;
use crate::metrics::HEIGHT_METRIC;
use crate::monitor::MonitorSettings;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Node binary produced by the default build step.
pub const DEFAULT_NODE_BINARY: &str = "target/release/papyrus_node";

/// Default build step, run from the working directory.
pub const DEFAULT_BUILD_COMMAND: [&str; 5] =
    ["cargo", "build", "--release", "--package", "papyrus_node"];

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// L1 endpoint shared by every node
    pub base_layer_node_url: String,

    /// Cluster size (at least 2)
    pub num_validators: usize,

    /// Existing directory with `data0..data{N-1}` to reuse
    pub db_dir: Option<PathBuf>,

    /// Where node logs go (fresh temp dir when `None`)
    pub logs_dir: Option<PathBuf>,

    /// Seconds a known height may stay unchanged
    pub stagnation_threshold_secs: u64,

    /// Total run length in seconds (unbounded when `None`)
    pub duration_secs: Option<u64>,

    /// Seconds between polling iterations
    pub monitoring_period_secs: u64,

    /// Seconds a node gets to exit after SIGINT before it is killed
    pub stop_grace_secs: u64,

    pub node_binary: PathBuf,

    /// Build step run before launching; `None` skips it
    pub build_command: Option<Vec<String>>,

    /// Derive the bootstrap identity from this seed instead of the fixed key
    pub bootstrap_seed: Option<u64>,

    /// Metric the height is read from
    pub height_metric: String,

    pub collect_metrics: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        let monitor = MonitorSettings::default();
        Self {
            base_layer_node_url: String::new(),
            num_validators: MIN_VALIDATORS,
            db_dir: None,
            logs_dir: None,
            stagnation_threshold_secs: monitor.stagnation_timeout.as_secs(),
            duration_secs: monitor.duration.map(|d| d.as_secs()),
            monitoring_period_secs: monitor.monitoring_period.as_secs(),
            stop_grace_secs: monitor.stop_grace.as_secs(),
            node_binary: PathBuf::from(DEFAULT_NODE_BINARY),
            build_command: Some(DEFAULT_BUILD_COMMAND.iter().map(|s| s.to_string()).collect()),
            bootstrap_seed: None,
            height_metric: HEIGHT_METRIC.to_string(),
            collect_metrics: true,
        }
    }
}

impl SimulationConfig {
    pub fn new(base_layer_node_url: impl Into<String>, num_validators: usize) -> Self {
        Self {
            base_layer_node_url: base_layer_node_url.into(),
            num_validators,
            ..Default::default()
        }
    }

    pub fn with_db_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.db_dir = Some(dir.into());
        self
    }

    pub fn with_logs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.logs_dir = Some(dir.into());
        self
    }

    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_stagnation_threshold(mut self, secs: u64) -> Self {
        self.stagnation_threshold_secs = secs;
        self
    }

    pub fn with_monitoring_period(mut self, secs: u64) -> Self {
        self.monitoring_period_secs = secs;
        self
    }

    pub fn with_stop_grace(mut self, secs: u64) -> Self {
        self.stop_grace_secs = secs;
        self
    }

    pub fn with_node_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.node_binary = path.into();
        self
    }

    pub fn with_build_command(mut self, command: Option<Vec<String>>) -> Self {
        self.build_command = command;
        self
    }

    pub fn with_bootstrap_seed(mut self, seed: u64) -> Self {
        self.bootstrap_seed = Some(seed);
        self
    }

    /// Rejects configurations that cannot produce a valid run.
    pub fn validate(&self) -> Result<()> {
        if self.num_validators < MIN_VALIDATORS {
            return Err(SimError::TooFewValidators {
                requested: self.num_validators,
                min: MIN_VALIDATORS,
            });
        }
        if self.base_layer_node_url.trim().is_empty() {
            return Err(SimError::config("base layer node url is required"));
        }
        if self.monitoring_period_secs == 0 {
            return Err(SimError::config("monitoring period must be positive"));
        }
        if matches!(&self.build_command, Some(cmd) if cmd.is_empty()) {
            return Err(SimError::config("build command must not be empty"));
        }
        Ok(())
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            monitoring_period: Duration::from_secs(self.monitoring_period_secs),
            duration: self.duration_secs.map(Duration::from_secs),
            stagnation_timeout: Duration::from_secs(self.stagnation_threshold_secs),
            stop_grace: Duration::from_secs(self.stop_grace_secs),
        }
    }

    /// The bootstrap identity for this run, checked for consistency.
    pub fn bootstrap_identity(&self) -> Result<BootstrapIdentity> {
        let identity = match self.bootstrap_seed {
            Some(seed) => BootstrapIdentity::from_seed(seed),
            None => BootstrapIdentity::fixed()?,
        };
        identity.verify()?;
        Ok(identity)
    }
}
