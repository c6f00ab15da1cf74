//! In-process fakes for driving the harness without real nodes.

use crate::cluster::ClusterConfig;
use crate::identity::BootstrapIdentity;
use crate::metrics::HeightProbe;

use async_trait::async_trait;
use consensus_env::{CommandSpec, EnvError, ProcessExit, ProcessGroup, ProcessLauncher, ValidatorId};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub fn test_config(num_validators: usize) -> ClusterConfig {
    ClusterConfig {
        node_binary: PathBuf::from("target/release/papyrus_node"),
        base_layer_node_url: "http://localhost:8545".to_string(),
        num_validators,
        data_dir: PathBuf::from("/tmp/sim/db"),
        logs_dir: PathBuf::from("/tmp/sim/logs"),
        bootstrap_port: 4001,
        identity: BootstrapIdentity::fixed().unwrap(),
        collect_metrics: true,
    }
}

/// Something that happened to a fake process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Launched(ValidatorId),
    Interrupted(ValidatorId),
    Killed(ValidatorId),
    Waited(ValidatorId),
}

/// Launcher that records events instead of spawning processes.
#[derive(Clone, Default)]
pub struct FakeLauncher {
    pub events: Arc<Mutex<Vec<Event>>>,
    fail_launch: HashSet<ValidatorId>,
    fail_stop: HashSet<ValidatorId>,
    ignore_interrupt: HashSet<ValidatorId>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_launch(mut self, id: ValidatorId) -> Self {
        self.fail_launch.insert(id);
        self
    }

    pub fn failing_stop(mut self, id: ValidatorId) -> Self {
        self.fail_stop.insert(id);
        self
    }

    /// The node keeps running after SIGINT until its group is killed.
    pub fn ignoring_interrupt(mut self, id: ValidatorId) -> Self {
        self.ignore_interrupt.insert(id);
        self
    }

    pub fn killed(&self) -> Vec<ValidatorId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Killed(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn launched(&self) -> Vec<ValidatorId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Launched(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn waited(&self) -> Vec<ValidatorId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Waited(id) => Some(id),
                _ => None,
            })
            .collect()
    }
}

fn validator_of(command: &CommandSpec) -> ValidatorId {
    let hex = command.get("consensus.validator_id").unwrap();
    ValidatorId(u64::from_str_radix(hex.trim_start_matches("0x"), 16).unwrap())
}

impl ProcessLauncher for FakeLauncher {
    fn launch(
        &self,
        command: &CommandSpec,
        _log_file: &Path,
    ) -> Result<Box<dyn ProcessGroup>, EnvError> {
        let id = validator_of(command);
        if self.fail_launch.contains(&id) {
            return Err(EnvError::spawn(
                command.program(),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        self.events.lock().unwrap().push(Event::Launched(id));
        Ok(Box::new(FakeProcess {
            id,
            events: self.events.clone(),
            fail_stop: self.fail_stop.contains(&id),
            ignore_interrupt: self.ignore_interrupt.contains(&id),
            killed: false,
        }))
    }
}

struct FakeProcess {
    id: ValidatorId,
    events: Arc<Mutex<Vec<Event>>>,
    fail_stop: bool,
    ignore_interrupt: bool,
    killed: bool,
}

#[async_trait]
impl ProcessGroup for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(1000 + self.id.index() as u32)
    }

    fn interrupt_group(&mut self) -> Result<(), EnvError> {
        if self.fail_stop {
            return Err(EnvError::process("refusing to stop"));
        }
        self.events.lock().unwrap().push(Event::Interrupted(self.id));
        Ok(())
    }

    fn kill_group(&mut self) -> Result<(), EnvError> {
        self.events.lock().unwrap().push(Event::Killed(self.id));
        self.killed = true;
        Ok(())
    }

    async fn wait(&mut self) -> Result<ProcessExit, EnvError> {
        if self.ignore_interrupt && !self.killed {
            std::future::pending::<()>().await;
        }
        self.events.lock().unwrap().push(Event::Waited(self.id));
        if self.killed {
            Ok(ProcessExit::with_signal(9))
        } else {
            Ok(ProcessExit::with_signal(2))
        }
    }
}

/// Probe answering from a closure over the monitoring port.
pub struct FnProbe<F>(pub F);

#[async_trait]
impl<F> HeightProbe for FnProbe<F>
where
    F: Fn(u16) -> Option<u64> + Send + Sync,
{
    async fn height(&self, monitoring_port: u16) -> Option<u64> {
        (self.0)(monitoring_port)
    }
}
