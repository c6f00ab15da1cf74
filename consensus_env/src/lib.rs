//! Consensus Cluster Environment Abstraction Layer
//!
//! This crate provides the seam between the cluster harness and the
//! operating system, so the harness logic can run against **Production**
//! (tokio + real processes) or **Test** (virtual clock + fake processes)
//! environments.
//!
//! # Core Concept
//!
//! Everything the harness does to the outside world goes through a trait:
//! - Time (`now()`, `sleep()`) via [`SimClock`]
//! - Process spawning via [`ProcessLauncher`]
//! - Whole-group shutdown (`interrupt_group()`, `kill_group()`, `wait()`) via [`ProcessGroup`]
//!
//! Commands are described as structured [`CommandSpec`] values and only
//! rendered to an argv at the launch boundary.
//!
//! # Example
//!
//! ```ignore
//! use consensus_env::{CommandSpec, ProcessLauncher, TokioLauncher};
//!
//! let command = CommandSpec::new("target/release/papyrus_node")
//!     .flag("consensus.validator_id", "0x1");
//! let mut group = TokioLauncher::new().launch(&command, log_path)?;
//! group.interrupt_group()?;
//! group.wait().await?;
//! ```

mod context;
mod error;
mod manual;
mod process;
mod tokio_impl;
mod types;

pub use context::SimClock;
pub use error::EnvError;
pub use manual::ManualClock;
pub use process::{ProcessExit, ProcessGroup, ProcessLauncher};
pub use tokio_impl::{strip_ansi, TokioClock, TokioLauncher, TokioProcessGroup};
pub use types::{CommandSpec, ValidatorId};
