//! OpenRaft consensus integration for sqlcluster.
//!
//! This crate replicates SQL statements through OpenRaft and applies them, in
//! log order, to the node's [`executor::Executor`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              Node                                        │
//! │  ┌───────────────┐     ┌──────────────┐     ┌───────────────────────┐   │
//! │  │ Query router  │────▶│ RaftConsensus│────▶│ PersistentRaftStore   │   │
//! │  │ (server)      │     │              │     │ (raft.log + state)    │   │
//! │  └───────────────┘     └──────────────┘     └───────────────────────┘   │
//! │                               │                        │                │
//! │                               ▼                        ▼                │
//! │                        ┌──────────────┐     ┌───────────────────────┐   │
//! │                        │ HTTP routes  │     │ ApplyHandler          │   │
//! │                        │ (/raft/*)    │     │ (Executor → sqlite3)  │   │
//! │                        └──────────────┘     └───────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//!                                │
//!                    ┌───────────┴───────────┐
//!                    ▼                       ▼
//!          ┌──────────────────┐    ┌──────────────────┐
//!          │   Peer           │    │   Peer           │
//!          │ (HTTP Client)    │    │ (HTTP Client)    │
//!          └──────────────────┘    └──────────────────┘
//! ```
//!
//! # Starting a node
//!
//! ```rust,ignore
//! use raft::{NodeConfig, RaftConsensus};
//!
//! let config = NodeConfig::new("/var/sqlcluster/node0", "127.0.0.1:4001")?;
//! let executor = Arc::new(Executor::open(
//!     ExecutorConfig::builder().store_path(config.store_path()).build(),
//! )?);
//! let consensus = RaftConsensus::open(&config, executor).await?;
//! consensus.bootstrap().await?;
//! ```
//!
//! # HTTP Endpoints
//!
//! Each node exposes the following Raft RPC endpoints:
//! - `POST /raft/append_entries` - Log replication from leader
//! - `POST /raft/vote` - Leader election votes
//! - `POST /raft/install_snapshot` - State transfer for lagging nodes
//!
//! # Modules
//!
//! - [`command`]: the replicated command and its apply response
//! - [`config`]: node configuration (name, directory, timeouts)
//! - [`consensus`]: the `Consensus` seam and its OpenRaft implementation
//! - [`http_server`]: Axum HTTP endpoints for Raft RPCs
//! - [`persistent_storage`]: durable Raft log storage
//! - [`network`]: HTTP transport for inter-node communication
//! - [`state_machine`]: the apply hook into the executor
//! - [`type_config`]: OpenRaft type configuration

pub mod command;
pub mod config;
pub mod consensus;
pub mod error;
pub mod http_server;
pub mod network;
pub mod persistent_storage;
pub mod state_machine;
pub mod type_config;

pub use command::{Command, CommandResponse};
pub use common::NodeId;
pub use config::NodeConfig;
pub use consensus::{Consensus, RaftConsensus};
pub use error::ConsensusError;
pub use http_server::{create_router, RaftHttpState};
pub use network::{HttpNetwork, HttpNetworkFactory};
pub use persistent_storage::PersistentRaftStore;
pub use state_machine::ApplyHandler;
pub use type_config::TypeConfig;

use openraft::Raft;

/// The Raft consensus node type for this cluster.
pub type RaftNode = Raft<TypeConfig>;
