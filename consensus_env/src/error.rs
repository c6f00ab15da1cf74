//! Error types for the environment abstraction.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while talking to the operating system.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The node binary could not be started
    #[error("Failed to spawn `{}`: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Delivering a signal to a process group failed
    #[error("Failed to signal process group {pgid}: {source}")]
    Signal {
        pgid: u32,
        #[source]
        source: nix::errno::Errno,
    },

    /// Waiting for a process to exit failed
    #[error("Failed to wait for process {pid}: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },

    /// Filesystem operation on a harness-owned path failed
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Operation on a process handle that has no backing process
    #[error("Process error: {0}")]
    Process(String),
}

impl EnvError {
    /// Creates a spawn error.
    pub fn spawn(program: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Creates an I/O error bound to a path.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a generic process error.
    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }
}
