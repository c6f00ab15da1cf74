//! Common types for the harness environment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Index of a validator within the simulated cluster.
///
/// Two indices carry a fixed role: `0` is the proposer and `1` is the
/// bootstrap peer. Every other index is an ordinary validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValidatorId(pub u64);

impl ValidatorId {
    /// The validator that proposes values in each round.
    pub const PROPOSER: Self = Self(0);

    /// The rendezvous peer every other node dials first.
    pub const BOOTSTRAP: Self = Self(1);

    /// Returns the raw index.
    pub fn index(&self) -> u64 {
        self.0
    }

    pub fn is_proposer(&self) -> bool {
        *self == Self::PROPOSER
    }

    pub fn is_bootstrap(&self) -> bool {
        *self == Self::BOOTSTRAP
    }

    /// Hex form passed to the node's `consensus.validator_id` flag.
    pub fn to_hex(&self) -> String {
        format!("{:#x}", self.0)
    }
}

impl fmt::Display for ValidatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A structured command line: a program, ordered `--flag value` pairs and
/// environment variables.
///
/// Nothing is ever interpolated into a shell string; the command is rendered
/// to an argv only when the process is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    program: PathBuf,
    flags: Vec<(String, String)>,
    env: Vec<(String, String)>,
}

impl CommandSpec {
    /// Creates an empty command for `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            flags: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Appends a `--name value` pair. `name` is given without the dashes.
    pub fn flag(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.push_flag(name, value);
        self
    }

    /// In-place variant of [`CommandSpec::flag`].
    pub fn push_flag(&mut self, name: impl Into<String>, value: impl ToString) {
        self.flags.push((name.into(), value.to_string()));
    }

    /// Sets an environment variable for the launched process.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn flags(&self) -> &[(String, String)] {
        &self.flags
    }

    pub fn env_vars(&self) -> &[(String, String)] {
        &self.env
    }

    /// Returns the value of the first flag called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.flags
            .iter()
            .find(|(flag, _)| flag == name)
            .map(|(_, value)| value.as_str())
    }

    /// Renders the flags to argv form, e.g. `["--a", "1", "--b", "2"]`.
    pub fn to_args(&self) -> Vec<String> {
        self.flags
            .iter()
            .flat_map(|(name, value)| [format!("--{}", name), value.clone()])
            .collect()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, value)?;
        }
        write!(f, "{}", self.program.display())?;
        for arg in self.to_args() {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
