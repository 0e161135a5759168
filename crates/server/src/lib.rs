//! A sqlcluster node.
//!
//! Each node serves the query routes (`/sql`, `/healthcheck`, `/join`,
//! `/status`) and the Raft RPC routes (`/raft/*`) on one HTTP listener.
//! Statements submitted to the leader are replicated through the Raft log and
//! applied, in order, by every node's executor.
//!
//! ```rust,ignore
//! use raft::NodeConfig;
//! use server::{Node, ServerConfig};
//!
//! let node = NodeConfig::new("/var/sqlcluster/node0", "127.0.0.1:4001")?;
//! let node = Node::start(ServerConfig::new(node)).await?;
//! node.fatal().await;
//! ```

pub mod config;
pub mod error;
pub mod join;
pub mod node;
pub mod router;

pub use config::{DEFAULT_COMMIT_TIMEOUT, ServerConfig};
pub use error::{ApiError, NodeError};
pub use join::{JOIN_BACKOFF, join_cluster};
pub use node::Node;
pub use router::{AppState, router};
