//! Error types for the cluster harness.

use consensus_env::{EnvError, ValidatorId};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Every fatal condition a simulation run can hit.
///
/// Stagnation and an elapsed duration are *not* errors; they are
/// [`RunOutcome`](crate::RunOutcome) variants.
#[derive(Debug, Error)]
pub enum SimError {
    /// Fewer validators requested than the cluster topology needs
    #[error("At least {min} validators are required for the simulation, got {requested}")]
    TooFewValidators { requested: usize, min: usize },

    /// A reused data directory lacks per-validator subdirectories
    #[error("{} must contain: {}", .db_dir.display(), .missing.join(", "))]
    MissingDataDirs { db_dir: PathBuf, missing: Vec<String> },

    /// Another simulation holds the directory lock
    #[error(
        "Could not acquire lock for {}, {} is in use by another simulation",
        .lock_file.display(),
        .dir.display()
    )]
    DirectoryLocked { lock_file: PathBuf, dir: PathBuf },

    /// No free TCP port could be obtained
    #[error("Failed to allocate a free TCP port: {0}")]
    PortAllocation(#[source] io::Error),

    /// The node binary build step failed
    #[error("Build step `{command}` failed: {reason}")]
    BuildFailed { command: String, reason: String },

    /// A node's known height went backwards
    #[error("Height of validator {validator} decreased from {previous} to {observed}")]
    HeightRegression {
        validator: ValidatorId,
        previous: u64,
        observed: u64,
    },

    /// Bootstrap secret key is malformed
    #[error("Invalid bootstrap identity: {0}")]
    InvalidIdentity(String),

    /// Invalid simulation configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Process or filesystem failure from the environment layer
    #[error(transparent)]
    Env(#[from] EnvError),

    /// Filesystem failure on a harness-owned path
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SimError {
    /// Creates an I/O error bound to a path.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

pub type Result<T, E = SimError> = std::result::Result<T, E>;
