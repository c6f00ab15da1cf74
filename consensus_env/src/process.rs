//! Process abstraction for cluster members.

use async_trait::async_trait;
use std::fmt;
use std::path::Path;

use crate::error::EnvError;
use crate::types::CommandSpec;

/// How a process group leader terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, if the process exited normally
    pub code: Option<i32>,

    /// Terminating signal, if the process was killed by one
    pub signal: Option<i32>,
}

impl ProcessExit {
    /// An exit with the given status code.
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// An exit caused by the given signal.
    pub fn with_signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown exit"),
        }
    }
}

/// A running process that leads its own process group.
///
/// Shutdown is a two-step capability: signal the whole subtree, then wait
/// for the leader. Implementations decide how "the whole subtree" is
/// addressed on their platform.
///
/// # Lifecycle
///
/// ```text
/// launch() ──► running ──interrupt_group()──► shutting down ──wait()──► exited
///                                                  │
///                                             kill_group()
/// ```
#[async_trait]
pub trait ProcessGroup: Send {
    /// Returns the OS id of the group leader while it is still running.
    fn id(&self) -> Option<u32>;

    /// Asks every process in the group to shut down gracefully (SIGINT).
    ///
    /// Signaling a group whose leader has already exited is not an error.
    fn interrupt_group(&mut self) -> Result<(), EnvError>;

    /// Forcibly terminates every process in the group (SIGKILL).
    ///
    /// Used when the group ignores the interrupt. Same no-op rule as
    /// [`interrupt_group`](Self::interrupt_group).
    fn kill_group(&mut self) -> Result<(), EnvError>;

    /// Blocks until the group leader exits.
    async fn wait(&mut self) -> Result<ProcessExit, EnvError>;
}

/// Starts cluster member processes.
pub trait ProcessLauncher: Send + Sync {
    /// Launches `command` as a new process group leader.
    ///
    /// The process's standard output is captured into `log_file` with
    /// terminal color sequences removed.
    fn launch(&self, command: &CommandSpec, log_file: &Path)
        -> Result<Box<dyn ProcessGroup>, EnvError>;
}
