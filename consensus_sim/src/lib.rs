//! Multi-process consensus cluster simulation harness
//!
//! Launches a local cluster of consensus validator nodes, watches their
//! reported heights and tears everything down when the run ends.
//!
//! # Core Principle: Orderly Shutdown
//!
//! Every exit path stops every started node:
//! - **Duration**: the configured run length elapsed
//! - **Stagnation**: some node's known height stopped advancing
//! - **Interrupt**: Ctrl-C from the operator
//! - **Failure**: a spawn error or a height regression
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Orchestrator                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐   │
//! │  │   DirLock    │  │ PortAllocator│  │ BootstrapIdentity│   │
//! │  └──────────────┘  └──────┬───────┘  └────────┬─────────┘   │
//! │                           └─────────┬─────────┘             │
//! │                             ┌───────▼────────┐              │
//! │                             │ ClusterBuilder │              │
//! │                             └───────┬────────┘              │
//! │  ┌──────────────────────────────────▼────────────────────┐  │
//! │  │ SimulationMonitor (SimClock + ProcessLauncher)         │  │
//! │  │   ┌────────┐   ┌────────┐   ┌────────┐                 │  │
//! │  │   │ Node 1 │   │ Node 2 │   │ Node 0 │   ...           │  │
//! │  │   └───▲────┘   └───▲────┘   └───▲────┘                 │  │
//! │  │       └────────────┼────────────┘                      │  │
//! │  │               HeightProbe (HTTP metrics)               │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use consensus_sim::{Orchestrator, OsPortAllocator, HttpHeightProbe, SimulationConfig};
//! use consensus_env::{TokioClock, TokioLauncher};
//! use std::sync::Arc;
//!
//! let config = SimulationConfig::new("http://localhost:8545", 3).with_duration(300);
//! let report = Orchestrator::new(
//!     config,
//!     Arc::new(TokioClock::new()),
//!     Arc::new(TokioLauncher::new()),
//!     Arc::new(HttpHeightProbe::default()),
//!     Box::new(OsPortAllocator),
//! )
//! .run(async { let _ = tokio::signal::ctrl_c().await; })
//! .await?;
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod identity;
pub mod lock;
pub mod metrics;
pub mod monitor;
pub mod node;
pub mod orchestrator;
pub mod ports;

#[cfg(test)]
mod testing;

pub use cluster::{ClusterBuilder, ClusterConfig, MIN_VALIDATORS};
pub use config::SimulationConfig;
pub use error::{Result, SimError};
pub use identity::BootstrapIdentity;
pub use lock::DirLock;
pub use metrics::{HeightProbe, HttpHeightProbe};
pub use monitor::{MonitorPhase, MonitorSettings, RunOutcome, SimulationMonitor};
pub use node::{Liveness, Node, NodeRole, NodeSpec};
pub use orchestrator::{NodeReport, Orchestrator, RunReport};
pub use ports::{OsPortAllocator, PortAllocator, SequentialPorts};
