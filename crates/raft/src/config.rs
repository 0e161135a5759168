//! Raft node configuration.

use common::transport::{self, TransportError};
use common::{Member, NodeId, NodeName};
use openraft::{ConfigError, SnapshotPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for one node in the cluster.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name of this node, unique within the cluster.
    pub name: NodeName,

    /// Directory for the Raft log, Raft state and the SQL store.
    pub data_dir: PathBuf,

    /// Address this node listens on (e.g., "127.0.0.1:4001").
    pub listen_addr: String,

    /// Listen address of an existing member to join, if any.
    pub join: Option<String>,

    /// Election timeout range in milliseconds.
    /// A random value within this range is used for each election.
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,

    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: NodeName::new("127.0.0.1-4001"),
            data_dir: PathBuf::from("./sqlcluster_data"),
            listen_addr: "127.0.0.1:4001".to_string(),
            join: None,
            election_timeout_min_ms: 150,
            election_timeout_max_ms: 300,
            heartbeat_interval_ms: 50,
        }
    }
}

impl NodeConfig {
    /// Create a configuration for a node listening on `listen_addr`, named
    /// after that address.
    pub fn new(data_dir: impl Into<PathBuf>, listen_addr: impl Into<String>) -> Result<Self, TransportError> {
        let listen_addr = listen_addr.into();
        Ok(Self {
            name: NodeName::from_listen_addr(&listen_addr)?,
            data_dir: data_dir.into(),
            listen_addr,
            ..Default::default()
        })
    }

    /// Override the derived node name.
    pub fn with_name(mut self, name: impl Into<NodeName>) -> Self {
        self.name = name.into();
        self
    }

    /// Join the cluster that `target` belongs to on first start.
    pub fn with_join(mut self, target: impl Into<String>) -> Self {
        self.join = Some(target.into());
        self
    }

    /// Set election timeout range.
    pub fn with_election_timeout(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.election_timeout_min_ms = min_ms;
        self.election_timeout_max_ms = max_ms;
        self
    }

    /// Set heartbeat interval.
    pub fn with_heartbeat_interval(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = ms;
        self
    }

    /// Raft identity of this node.
    pub fn node_id(&self) -> NodeId {
        self.name.node_id()
    }

    /// This node as it appears in cluster membership.
    pub fn member(&self) -> Result<Member, TransportError> {
        Ok(Member::new(
            self.name.as_str(),
            transport::encode(&self.listen_addr)?,
        ))
    }

    /// Path to the Raft log file.
    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("raft.log")
    }

    /// Path to the Raft state file (vote, committed index).
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("raft_state.json")
    }

    /// Path to the SQL store owned by the executor.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("storage.sql")
    }

    /// Build a validated OpenRaft config from this node config.
    ///
    /// Snapshots are never taken automatically: the log is the only record
    /// of the store.
    pub fn to_openraft_config(&self) -> Result<openraft::Config, ConfigError> {
        openraft::Config {
            cluster_name: "sqlcluster".to_string(),
            election_timeout_min: self.election_timeout_min_ms,
            election_timeout_max: self.election_timeout_max_ms,
            heartbeat_interval: self.heartbeat_interval_ms,
            snapshot_policy: SnapshotPolicy::Never,
            ..Default::default()
        }
        .validate()
    }
}
