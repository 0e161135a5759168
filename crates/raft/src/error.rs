//! Failures while bringing up or driving the consensus adapter.

use crate::NodeId;
use common::TransportError;
use openraft::error::Fatal;
use openraft::ConfigError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("invalid raft config: {0}")]
    Config(#[from] ConfigError),

    #[error("raft storage: {0}")]
    Storage(#[from] io::Error),

    #[error("address: {0}")]
    Transport(#[from] TransportError),

    #[error("raft network client: {0}")]
    Network(#[from] reqwest::Error),

    #[error("raft stopped: {0}")]
    Fatal(#[from] Fatal<NodeId>),

    #[error("failed to initialize cluster: {0}")]
    Initialize(String),
}
