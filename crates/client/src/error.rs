//! Error types for the client library.

use common::TransportError;
use thiserror::Error;

/// Result type alias using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The node address could not be turned into a URL
    #[error("invalid address: {0}")]
    Address(#[from] TransportError),

    /// The request never got a response (connect, redirect loop, body read)
    #[error("connection error: {0}")]
    Connection(#[source] reqwest::Error),

    /// The cluster answered with an error, e.g. `Timeout` or `No peers`
    #[error("cluster error: {0}")]
    Cluster(String),

    /// A success response without the `SequenceNumber` header line
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ClientError {
    /// Returns true if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, ClientError::Connection(_))
    }

    /// Returns true if the cluster rejected the statement.
    pub fn is_cluster_error(&self) -> bool {
        matches!(self, ClientError::Cluster(_))
    }

    /// Returns the cluster's error text, if the cluster rejected the statement.
    pub fn cluster_message(&self) -> Option<&str> {
        match self {
            ClientError::Cluster(message) => Some(message),
            _ => None,
        }
    }
}
