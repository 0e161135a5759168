//! Shared identity, membership, and error types for the sql cluster.
//!
//! Every other crate in the workspace speaks in terms of [`NodeName`],
//! [`Member`], and [`ClusterError`]; the address helpers that turn listen
//! addresses into connection strings live in [`transport`].


pub mod transport;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use transport::TransportError;

/// Consensus-level node identifier.
///
/// Derived from a [`NodeName`] so that every node computes the same id for
/// the same peer without any coordination.
pub type NodeId = u64;

/// Human-readable node identity, unique within a cluster.
/// Examples:
/// - `NodeName::new("node0")`
/// - `NodeName::from_listen_addr("127.0.0.1:4001")` → `127.0.0.1-4001`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct NodeName(String);

impl NodeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Derive the node name from the address the node listens on.
    ///
    /// `host:port` becomes `host-port`. Socket paths are refused.
    pub fn from_listen_addr(listen: &str) -> Result<Self, TransportError> {
        let listen = listen.trim();
        if listen.is_empty() {
            return Err(TransportError::Empty);
        }

        if transport::is_socket_path(listen) {
            return Err(TransportError::SocketPath(listen.to_string()));
        }

        let (host, port) = transport::split_host_port(listen)?;
        Ok(Self(format!("{host}-{port}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The consensus id for this name (CRC32 of the UTF-8 bytes).
    pub fn node_id(&self) -> NodeId {
        crc32fast::hash(self.0.as_bytes()) as NodeId
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A cluster member as carried by membership changes and join requests.
///
/// Serialized as `{"name": ..., "connectionString": ...}`.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub name: String,
    pub connection_string: String,
}

impl Member {
    pub fn new(name: impl Into<String>, connection_string: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connection_string: connection_string.into(),
        }
    }

    pub fn node_name(&self) -> NodeName {
        NodeName::new(self.name.clone())
    }

    pub fn node_id(&self) -> NodeId {
        self.node_name().node_id()
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.connection_string)
    }
}

/// The local node's role as reported by the consensus engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Leader,
    Follower,
    Candidate,
    Learner,
    Shutdown,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Leader => "leader",
            Role::Follower => "follower",
            Role::Candidate => "candidate",
            Role::Learner => "learner",
            Role::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// A node's view of the cluster, as served on `GET /status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub name: String,
    pub role: Role,
    pub leader: Option<Member>,
    pub peers: Vec<Member>,
}

/// Failures surfaced to clients of the query router.
///
/// Every variant renders as plain text suitable for a response body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// No leader is known and there is no peer to ask.
    #[error("No peers")]
    NotReady,
    /// The command was not applied within the commit bound.
    #[error("Timeout")]
    Timeout,
    /// The consensus engine refused or failed to commit the command.
    #[error("{0}")]
    ApplyRejected(String),
    /// A membership change could not be committed.
    #[error("{0}")]
    MembershipRejected(String),
    /// The request could not be decoded.
    #[error("{0}")]
    BadRequest(String),
}

/// Result alias that carries a `ClusterError`.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::transport;
    pub use crate::{ClusterError, ClusterResult, Member, NodeId, NodeName, NodeStatus, Role};
}
