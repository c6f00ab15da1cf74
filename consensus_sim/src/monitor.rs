//! Simulation monitor - starts the cluster, polls heights, stops everything.

use crate::error::Result;
use crate::metrics::HeightProbe;
use crate::node::Node;

use consensus_env::{ProcessLauncher, SimClock, ValidatorId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default pause between two polling iterations.
pub const DEFAULT_MONITORING_PERIOD: Duration = Duration::from_secs(10);

/// Default time a known height may stay unchanged.
pub const DEFAULT_STAGNATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time a node gets to exit after SIGINT before it is killed.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(30);

/// Lifecycle of a simulation run.
///
/// ```text
/// Starting ──► Monitoring ──► Stopping ──► Stopped
///     └────────────────────────┘ (spawn failure)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Starting,
    Monitoring,
    Stopping,
    Stopped,
}

/// Why a monitored run ended. None of these is a failure of the harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The configured duration passed without stagnation
    DurationElapsed,

    /// These nodes stopped making progress
    Stagnated { validators: Vec<ValidatorId> },

    /// An external interrupt asked the run to stop
    Interrupted,
}

/// Timing parameters of the monitor loop.
#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub monitoring_period: Duration,

    /// Total run length; `None` runs until interrupted or stagnated
    pub duration: Option<Duration>,

    pub stagnation_timeout: Duration,

    /// How long `stop` waits after SIGINT before escalating to SIGKILL
    pub stop_grace: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            monitoring_period: DEFAULT_MONITORING_PERIOD,
            duration: None,
            stagnation_timeout: DEFAULT_STAGNATION_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

/// Drives a cluster through its lifecycle.
///
/// The monitor is the only component that touches node state after the
/// cluster is built. Whatever happens while starting or monitoring, every
/// started node is stopped before [`run`](Self::run) returns.
pub struct SimulationMonitor {
    clock: Arc<dyn SimClock>,
    launcher: Arc<dyn ProcessLauncher>,
    probe: Arc<dyn HeightProbe>,
    settings: MonitorSettings,
    phase: MonitorPhase,
}

impl SimulationMonitor {
    pub fn new(
        clock: Arc<dyn SimClock>,
        launcher: Arc<dyn ProcessLauncher>,
        probe: Arc<dyn HeightProbe>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            clock,
            launcher,
            probe,
            settings,
            phase: MonitorPhase::Starting,
        }
    }

    pub fn phase(&self) -> MonitorPhase {
        self.phase
    }

    /// Runs the cluster until duration, stagnation or `interrupt`.
    ///
    /// Nodes are started in slice order. Returns `Err` for spawn failures
    /// and height regressions, but only after all nodes have been stopped.
    pub async fn run<I>(&mut self, nodes: &mut [Node], interrupt: I) -> Result<RunOutcome>
    where
        I: Future<Output = ()>,
    {
        self.phase = MonitorPhase::Starting;
        let result = self.start_and_monitor(nodes, interrupt).await;

        if let Err(e) = &result {
            error!("{}", e);
        }

        self.phase = MonitorPhase::Stopping;
        self.stop_all(nodes).await;
        self.phase = MonitorPhase::Stopped;

        result
    }

    async fn start_and_monitor<I>(&mut self, nodes: &mut [Node], interrupt: I) -> Result<RunOutcome>
    where
        I: Future<Output = ()>,
    {
        for node in nodes.iter_mut() {
            node.start(self.launcher.as_ref())?;
        }

        self.phase = MonitorPhase::Monitoring;
        let start = self.clock.now();
        tokio::pin!(interrupt);

        loop {
            let iteration = async {
                self.clock.sleep(self.settings.monitoring_period).await;
                self.poll(nodes, start).await
            };

            tokio::select! {
                polled = iteration => {
                    if let Some(outcome) = polled? {
                        return Ok(outcome);
                    }
                }
                _ = &mut interrupt => {
                    info!("Terminating subprocesses...");
                    return Ok(RunOutcome::Interrupted);
                }
            }
        }
    }

    /// One monitoring iteration. `Some` means the run should end.
    async fn poll(&self, nodes: &mut [Node], start: Duration) -> Result<Option<RunOutcome>> {
        let now = self.clock.now();
        let elapsed = now.saturating_sub(start);
        info!("Time elapsed: {:.1}s", elapsed.as_secs_f64());

        let mut stagnated = Vec::new();
        for node in nodes.iter_mut() {
            let liveness = node.update_liveness(self.probe.as_ref(), now).await?;
            match liveness.height {
                Some(height) => info!("Node: {}, height: {}", node.validator_id(), height),
                None => info!("Node: {}, height: unknown", node.validator_id()),
            }
            if liveness.is_stagnant(now, self.settings.stagnation_timeout) {
                stagnated.push(node.validator_id());
            }
        }

        if let Some(duration) = self.settings.duration {
            if elapsed >= duration {
                info!("Simulation duration of {}s reached", duration.as_secs());
                return Ok(Some(RunOutcome::DurationElapsed));
            }
        }

        if !stagnated.is_empty() {
            let ids: Vec<String> = stagnated.iter().map(ToString::to_string).collect();
            warn!("Nodes [{}] have stagnated. Exiting simulation.", ids.join(", "));
            return Ok(Some(RunOutcome::Stagnated { validators: stagnated }));
        }

        Ok(None)
    }

    /// Best-effort shutdown of every started node.
    async fn stop_all(&self, nodes: &mut [Node]) {
        for node in nodes.iter_mut().filter(|n| n.is_running()) {
            let id = node.validator_id();
            match node.stop(self.clock.as_ref(), self.settings.stop_grace).await {
                Ok(Some(exit)) => info!("Validator {} stopped ({})", id, exit),
                Ok(None) => {}
                Err(e) => warn!("Failed to stop validator {}: {}", id, e),
            }
        }
    }
}
