//! A single cluster member: its launch spec, process and observed liveness.

use crate::error::{Result, SimError};
use crate::metrics::HeightProbe;

use consensus_env::{CommandSpec, ProcessExit, ProcessGroup, ProcessLauncher, SimClock, ValidatorId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Role a validator plays in cluster formation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    /// Rendezvous peer with the pre-shared identity
    Bootstrap,

    /// Joins through the bootstrap peer
    Validator,

    /// Proposes values; started last
    Proposer,
}

impl NodeRole {
    pub fn of(id: ValidatorId) -> Self {
        if id.is_bootstrap() {
            NodeRole::Bootstrap
        } else if id.is_proposer() {
            NodeRole::Proposer
        } else {
            NodeRole::Validator
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Bootstrap => write!(f, "bootstrap"),
            NodeRole::Validator => write!(f, "validator"),
            NodeRole::Proposer => write!(f, "proposer"),
        }
    }
}

/// Everything needed to launch one node. Produced by the cluster builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub validator_id: ValidatorId,
    pub role: NodeRole,

    /// libp2p TCP listen port
    pub tcp_port: u16,

    /// JSON-RPC listen port
    pub rpc_port: u16,

    /// Monitoring gateway port (metrics endpoint)
    pub monitoring_port: u16,

    /// Storage path prefix (`<db_dir>/data{i}`)
    pub data_dir: PathBuf,

    /// Color-stripped stdout capture (`<logs_dir>/validator{i}.txt`)
    pub log_file: PathBuf,

    pub command: CommandSpec,
}

/// Last observed height and when it last changed.
///
/// Known heights only ever increase. An unknown probe result never
/// overwrites a known height and never resets the timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Liveness {
    pub height: Option<u64>,

    /// Clock time of the last height change
    pub last_change: Option<Duration>,
}

impl Liveness {
    /// Folds one probe result into the state.
    ///
    /// Returns `HeightRegression` if `observed` is below the known height.
    pub fn observe(
        &mut self,
        validator: ValidatorId,
        observed: Option<u64>,
        now: Duration,
    ) -> Result<()> {
        let Some(observed) = observed else {
            return Ok(());
        };

        match self.height {
            Some(previous) if observed == previous => {}
            Some(previous) if observed < previous => {
                return Err(SimError::HeightRegression {
                    validator,
                    previous,
                    observed,
                });
            }
            _ => {
                self.height = Some(observed);
                self.last_change = Some(now);
            }
        }
        Ok(())
    }

    /// True if a known height has not moved for longer than `timeout`.
    ///
    /// A node that never reported a height is never stagnant.
    pub fn is_stagnant(&self, now: Duration, timeout: Duration) -> bool {
        match (self.height, self.last_change) {
            (Some(_), Some(changed)) => now.saturating_sub(changed) > timeout,
            _ => false,
        }
    }
}

/// A cluster member. Owns its process handle exclusively once started.
pub struct Node {
    spec: NodeSpec,
    process: Option<Box<dyn ProcessGroup>>,
    liveness: Liveness,
}

impl Node {
    pub fn new(spec: NodeSpec) -> Self {
        Self {
            spec,
            process: None,
            liveness: Liveness::default(),
        }
    }

    pub fn spec(&self) -> &NodeSpec {
        &self.spec
    }

    pub fn validator_id(&self) -> ValidatorId {
        self.spec.validator_id
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    /// Launches the node as a new process group leader.
    pub fn start(&mut self, launcher: &dyn ProcessLauncher) -> Result<()> {
        if self.process.is_some() {
            return Ok(());
        }
        info!(
            "Starting {} {} (tcp={}, monitoring={})",
            self.spec.role, self.spec.validator_id, self.spec.tcp_port, self.spec.monitoring_port
        );
        debug!("  {}", self.spec.command);

        let process = launcher.launch(&self.spec.command, &self.spec.log_file)?;
        self.process = Some(process);
        Ok(())
    }

    /// Interrupts the whole process group and waits for the leader.
    ///
    /// A group still running after `grace` is killed. No-op (returns
    /// `None`) on a node that was never started or is already stopped.
    pub async fn stop(
        &mut self,
        clock: &dyn SimClock,
        grace: Duration,
    ) -> Result<Option<ProcessExit>> {
        let Some(mut process) = self.process.take() else {
            return Ok(None);
        };
        process.interrupt_group()?;

        let exited = tokio::select! {
            biased;
            exit = process.wait() => Some(exit?),
            _ = clock.sleep(grace) => None,
        };
        let exit = match exited {
            Some(exit) => exit,
            None => {
                warn!(
                    "Validator {} ignored SIGINT for {}s, killing its process group",
                    self.spec.validator_id,
                    grace.as_secs()
                );
                process.kill_group()?;
                process.wait().await?
            }
        };
        debug!("Validator {} exited with {}", self.spec.validator_id, exit);
        Ok(Some(exit))
    }

    /// Current height as reported by the metrics endpoint, if any.
    pub async fn probe_height(&self, probe: &dyn HeightProbe) -> Option<u64> {
        probe.height(self.spec.monitoring_port).await
    }

    /// Probes the node and folds the result into its liveness state.
    pub async fn update_liveness(
        &mut self,
        probe: &dyn HeightProbe,
        now: Duration,
    ) -> Result<Liveness> {
        let observed = self.probe_height(probe).await;
        self.liveness.observe(self.spec.validator_id, observed, now)?;
        Ok(self.liveness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const V: ValidatorId = ValidatorId(3);

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_roles() {
        assert_eq!(NodeRole::of(ValidatorId(0)), NodeRole::Proposer);
        assert_eq!(NodeRole::of(ValidatorId(1)), NodeRole::Bootstrap);
        assert_eq!(NodeRole::of(ValidatorId(5)), NodeRole::Validator);
    }

    #[test]
    fn test_unchanged_height_keeps_timestamp() {
        let mut live = Liveness::default();
        live.observe(V, Some(4), secs(10)).unwrap();
        live.observe(V, Some(4), secs(20)).unwrap();

        assert_eq!(live.height, Some(4));
        assert_eq!(live.last_change, Some(secs(10)));
    }

    #[test]
    fn test_increase_records_time() {
        let mut live = Liveness::default();
        live.observe(V, Some(4), secs(10)).unwrap();
        live.observe(V, Some(6), secs(20)).unwrap();

        assert_eq!(live, Liveness { height: Some(6), last_change: Some(secs(20)) });
    }

    #[test]
    fn test_regression_is_error() {
        let mut live = Liveness::default();
        live.observe(V, Some(9), secs(10)).unwrap();

        let err = live.observe(V, Some(8), secs(20)).unwrap_err();
        assert!(matches!(
            err,
            SimError::HeightRegression { validator: V, previous: 9, observed: 8 }
        ));
        // State untouched by the failed observation
        assert_eq!(live.height, Some(9));
    }

    #[test]
    fn test_unknown_after_known_keeps_height() {
        let mut live = Liveness::default();
        live.observe(V, Some(5), secs(10)).unwrap();
        live.observe(V, None, secs(20)).unwrap();

        assert_eq!(live.height, Some(5));
        assert_eq!(live.last_change, Some(secs(10)));

        // A lower height after the gap is still a regression
        assert!(live.observe(V, Some(3), secs(30)).is_err());
    }

    #[test]
    fn test_never_known_never_stagnant() {
        let mut live = Liveness::default();
        for t in 0..100 {
            live.observe(V, None, secs(t * 10)).unwrap();
        }
        assert!(!live.is_stagnant(secs(10_000), secs(60)));
    }

    #[test]
    fn test_stagnation_threshold_is_strict() {
        let mut live = Liveness::default();
        live.observe(V, Some(1), secs(10)).unwrap();

        assert!(!live.is_stagnant(secs(70), secs(60)));
        assert!(live.is_stagnant(secs(71), secs(60)));
    }

    proptest! {
        #[test]
        fn prop_known_heights_non_decreasing(
            probes in prop::collection::vec(prop::option::of(0u64..50), 1..60)
        ) {
            let mut live = Liveness::default();
            let mut max_seen: Option<u64> = None;

            for (t, probe) in probes.iter().enumerate() {
                let result = live.observe(V, *probe, secs(t as u64));
                match (*probe, max_seen) {
                    (Some(h), Some(m)) if h < m => {
                        prop_assert!(result.is_err());
                        break;
                    }
                    (Some(h), _) => {
                        prop_assert!(result.is_ok());
                        max_seen = Some(h);
                    }
                    (None, _) => prop_assert!(result.is_ok()),
                }
                prop_assert_eq!(live.height, max_seen);
            }
        }

        #[test]
        fn prop_progressing_node_never_stagnant(
            steps in prop::collection::vec(1u64..5, 1..100),
            interval in 1u64..30,
        ) {
            // Height changes every polling interval; the timeout exceeds it.
            let timeout = secs(interval + 1);
            let mut live = Liveness::default();
            let mut height = 0;

            for (i, step) in steps.iter().enumerate() {
                height += step;
                let now = secs(i as u64 * interval);
                live.observe(V, Some(height), now).unwrap();
                prop_assert!(!live.is_stagnant(now + secs(interval), timeout));
            }
        }
    }
}
