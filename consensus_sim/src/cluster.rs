//! Cluster builder - lays out ports, identities and command lines.

use crate::error::{Result, SimError};
use crate::identity::BootstrapIdentity;
use crate::node::{NodeRole, NodeSpec};
use crate::ports::PortAllocator;

use consensus_env::{CommandSpec, ValidatorId};
use std::path::{Path, PathBuf};

/// Smallest cluster with both a bootstrap peer and a proposer.
pub const MIN_VALIDATORS: usize = 2;

/// `RUST_LOG` each node runs with.
pub const NODE_LOG_FILTER: &str = "papyrus_consensus=debug,papyrus=info";

/// Inputs of the cluster layout.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Node binary to launch
    pub node_binary: PathBuf,

    /// Shared L1 endpoint passed to every node
    pub base_layer_node_url: String,

    pub num_validators: usize,

    /// Parent of the `data{i}` storage directories
    pub data_dir: PathBuf,

    /// Parent of the `validator{i}.txt` log files
    pub logs_dir: PathBuf,

    /// TCP port reserved for the bootstrap peer, dialled by every other node
    pub bootstrap_port: u16,

    pub identity: BootstrapIdentity,

    pub collect_metrics: bool,
}

impl ClusterConfig {
    /// Storage directory of validator `id`.
    pub fn data_dir_of(&self, id: ValidatorId) -> PathBuf {
        data_subdir(&self.data_dir, id)
    }

    /// Log file of validator `id`.
    pub fn log_file_of(&self, id: ValidatorId) -> PathBuf {
        self.logs_dir.join(format!("validator{}.txt", id))
    }
}

/// `<root>/data{i}`.
pub fn data_subdir(root: &Path, id: ValidatorId) -> PathBuf {
    root.join(format!("data{}", id))
}

/// Produces node specs in start order.
pub struct ClusterBuilder<'a> {
    config: &'a ClusterConfig,
    ports: &'a mut dyn PortAllocator,
}

impl<'a> ClusterBuilder<'a> {
    pub fn new(config: &'a ClusterConfig, ports: &'a mut dyn PortAllocator) -> Self {
        Self { config, ports }
    }

    /// Builds every node in the order they must be started.
    ///
    /// 1. The bootstrap node (validator 1), so peers have someone to dial.
    /// 2. Validators 2..N, joining through the bootstrap node.
    /// 3. The proposer (validator 0), so no validator misses its proposals.
    pub fn build(mut self) -> Result<Vec<NodeSpec>> {
        let n = self.config.num_validators;
        if n < MIN_VALIDATORS {
            return Err(SimError::TooFewValidators {
                requested: n,
                min: MIN_VALIDATORS,
            });
        }

        let mut specs = Vec::with_capacity(n);
        specs.push(self.build_node(ValidatorId::BOOTSTRAP)?);
        for i in 2..n as u64 {
            specs.push(self.build_node(ValidatorId(i))?);
        }
        specs.push(self.build_node(ValidatorId::PROPOSER)?);

        Ok(specs)
    }

    fn build_node(&mut self, id: ValidatorId) -> Result<NodeSpec> {
        let config = self.config;
        let role = NodeRole::of(id);

        let tcp_port = match role {
            NodeRole::Bootstrap => config.bootstrap_port,
            _ => self.ports.allocate()?,
        };
        let monitoring_port = self.ports.allocate()?;
        let rpc_port = self.ports.allocate()?;
        let data_dir = config.data_dir_of(id);

        let mut command = CommandSpec::new(&config.node_binary)
            .env("RUST_LOG", NODE_LOG_FILTER)
            .flag("network.#is_none", false)
            .flag("base_layer.node_url", &config.base_layer_node_url)
            .flag("storage.db_config.path_prefix", data_dir.display())
            .flag("consensus.#is_none", false)
            .flag("consensus.validator_id", id.to_hex())
            .flag("consensus.num_validators", config.num_validators)
            .flag("network.tcp_port", tcp_port)
            .flag("rpc.server_address", format!("127.0.0.1:{}", rpc_port))
            .flag(
                "monitoring_gateway.server_address",
                format!("127.0.0.1:{}", monitoring_port),
            )
            .flag("collect_metrics", config.collect_metrics);

        match role {
            NodeRole::Bootstrap => {
                command.push_flag("network.secret_key", config.identity.secret_key_hex());
            }
            NodeRole::Validator | NodeRole::Proposer => {
                command.push_flag("network.bootstrap_peer_multiaddr.#is_none", false);
                command.push_flag(
                    "network.bootstrap_peer_multiaddr",
                    config.identity.multiaddr(config.bootstrap_port),
                );
            }
        }

        Ok(NodeSpec {
            validator_id: id,
            role,
            tcp_port,
            rpc_port,
            monitoring_port,
            data_dir,
            log_file: config.log_file_of(id),
            command,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::DEFAULT_PEER_ID;
    use crate::ports::SequentialPorts;
    use crate::testing::test_config;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn build(n: usize) -> Vec<NodeSpec> {
        let config = test_config(n);
        ClusterBuilder::new(&config, &mut SequentialPorts::starting_at(20_000))
            .build()
            .unwrap()
    }

    #[test]
    fn test_three_node_order() {
        let ids: Vec<u64> = build(3).iter().map(|s| s.validator_id.index()).collect();
        assert_eq!(ids, vec![1, 2, 0]);
    }

    #[test]
    fn test_two_node_cluster() {
        let specs = build(2);
        let ids: Vec<u64> = specs.iter().map(|s| s.validator_id.index()).collect();
        assert_eq!(ids, vec![1, 0]);
        assert_eq!(specs[0].role, NodeRole::Bootstrap);
        assert_eq!(specs[1].role, NodeRole::Proposer);
    }

    #[test]
    fn test_too_few_validators() {
        let config = test_config(1);
        let err = ClusterBuilder::new(&config, &mut SequentialPorts::starting_at(20_000))
            .build()
            .unwrap_err();
        assert!(matches!(err, SimError::TooFewValidators { requested: 1, min: 2 }));
    }

    #[test]
    fn test_bootstrap_command() {
        let specs = build(3);
        let boot = &specs[0];
        let cmd = &boot.command;

        assert_eq!(boot.tcp_port, 4001);
        assert_eq!(cmd.get("network.tcp_port"), Some("4001"));
        assert_eq!(
            cmd.get("network.secret_key"),
            Some(crate::identity::DEFAULT_SECRET_KEY)
        );
        assert_eq!(cmd.get("network.bootstrap_peer_multiaddr"), None);
        assert_eq!(cmd.get("consensus.validator_id"), Some("0x1"));
        assert_eq!(cmd.get("storage.db_config.path_prefix"), Some("/tmp/sim/db/data1"));
        assert_eq!(boot.log_file, PathBuf::from("/tmp/sim/logs/validator1.txt"));
        assert_eq!(
            cmd.env_vars(),
            &[("RUST_LOG".to_string(), NODE_LOG_FILTER.to_string())]
        );
    }

    #[test]
    fn test_peer_command_dials_bootstrap() {
        let specs = build(3);
        for spec in &specs[1..] {
            let cmd = &spec.command;
            assert_eq!(cmd.get("network.secret_key"), None);
            assert_eq!(cmd.get("network.bootstrap_peer_multiaddr.#is_none"), Some("false"));
            assert_eq!(
                cmd.get("network.bootstrap_peer_multiaddr"),
                Some(format!("/ip4/127.0.0.1/tcp/4001/p2p/{}", DEFAULT_PEER_ID).as_str())
            );
            assert_ne!(spec.tcp_port, 4001);
        }
    }

    #[test]
    fn test_common_flags() {
        for spec in build(4) {
            let cmd = &spec.command;
            assert_eq!(cmd.get("network.#is_none"), Some("false"));
            assert_eq!(cmd.get("consensus.#is_none"), Some("false"));
            assert_eq!(cmd.get("base_layer.node_url"), Some("http://localhost:8545"));
            assert_eq!(cmd.get("consensus.num_validators"), Some("4"));
            assert_eq!(cmd.get("collect_metrics"), Some("true"));
            assert_eq!(
                cmd.get("monitoring_gateway.server_address"),
                Some(format!("127.0.0.1:{}", spec.monitoring_port).as_str())
            );
            assert_eq!(
                cmd.get("rpc.server_address"),
                Some(format!("127.0.0.1:{}", spec.rpc_port).as_str())
            );
        }
    }

    #[test]
    fn test_ports_are_distinct() {
        let specs = build(5);
        let mut seen = HashSet::new();
        for spec in &specs {
            assert!(seen.insert(spec.tcp_port));
            assert!(seen.insert(spec.rpc_port));
            assert!(seen.insert(spec.monitoring_port));
        }
    }

    proptest! {
        #[test]
        fn prop_one_bootstrap_one_proposer_in_order(n in MIN_VALIDATORS..40) {
            let specs = build(n);
            prop_assert_eq!(specs.len(), n);

            let bootstraps = specs.iter().filter(|s| s.role == NodeRole::Bootstrap).count();
            let proposers = specs.iter().filter(|s| s.role == NodeRole::Proposer).count();
            prop_assert_eq!(bootstraps, 1);
            prop_assert_eq!(proposers, 1);

            prop_assert_eq!(specs.first().map(|s| s.role), Some(NodeRole::Bootstrap));
            prop_assert_eq!(specs.last().map(|s| s.role), Some(NodeRole::Proposer));

            let ids: HashSet<u64> = specs.iter().map(|s| s.validator_id.index()).collect();
            prop_assert_eq!(ids, (0..n as u64).collect::<HashSet<_>>());
        }
    }
}
