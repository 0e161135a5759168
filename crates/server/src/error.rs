//! Error types for the node: client-facing responses and startup failures.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::{ClusterError, TransportError};
use raft::ConsensusError;
use std::io;
use thiserror::Error;

/// A [`ClusterError`] rendered as an HTTP response.
///
/// Every failure is a 400 with the error text as a plain body line.
#[derive(Debug)]
pub struct ApiError(pub ClusterError);

impl From<ClusterError> for ApiError {
    fn from(err: ClusterError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, format!("{}\n", self.0)).into_response()
    }
}

/// Failures while starting a node.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("cannot join with an existing log")]
    ExistingLog,

    #[error("unsupported listen address {0}: only host:port is served")]
    UnsupportedListen(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to open store: {0}")]
    Store(#[from] io::Error),

    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_errors_are_bad_requests() {
        for err in [
            ClusterError::NotReady,
            ClusterError::Timeout,
            ClusterError::ApplyRejected("not leader".into()),
            ClusterError::BadRequest("bad json".into()),
        ] {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn existing_log_message() {
        assert_eq!(
            NodeError::ExistingLog.to_string(),
            "cannot join with an existing log"
        );
    }
}
