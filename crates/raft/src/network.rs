//! Raft transport over HTTP.
//!
//! Each RPC is a JSON POST to one of the `/raft/*` routes served by
//! [`crate::http_server`]. Peers are dialed at their member connection
//! string, so a node is reachable as soon as a membership entry names it.

use crate::type_config::TypeConfig;
use crate::NodeId;
use common::Member;
use openraft::error::{InstallSnapshotError, NetworkError, RPCError, RaftError, Unreachable};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Builds one [`HttpNetwork`] per peer, all sharing a connection pool.
#[derive(Clone, Debug)]
pub struct HttpNetworkFactory {
    client: reqwest::Client,
}

impl HttpNetworkFactory {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }
}

impl RaftNetworkFactory<TypeConfig> for HttpNetworkFactory {
    type Network = HttpNetwork;

    async fn new_client(&mut self, target: NodeId, node: &Member) -> Self::Network {
        HttpNetwork {
            target,
            base_url: node.connection_string.trim_end_matches('/').to_string(),
            client: self.client.clone(),
        }
    }
}

/// Why an RPC produced no reply.
#[derive(Error, Debug)]
enum RpcFailure {
    /// The request never reached the peer.
    #[error("peer unreachable: {0}")]
    Unreachable(reqwest::Error),
    /// The peer answered, but not with a usable reply.
    #[error("{0}")]
    Remote(String),
}

impl<E: std::error::Error> From<RpcFailure> for RPCError<NodeId, Member, E> {
    fn from(failure: RpcFailure) -> Self {
        match failure {
            RpcFailure::Unreachable(_) => RPCError::Unreachable(Unreachable::new(&failure)),
            RpcFailure::Remote(_) => RPCError::Network(NetworkError::new(&failure)),
        }
    }
}

/// Connection to a single peer.
#[derive(Clone, Debug)]
pub struct HttpNetwork {
    target: NodeId,
    base_url: String,
    client: reqwest::Client,
}

impl HttpNetwork {
    pub fn url(&self, route: &str) -> String {
        format!("{}/raft/{route}", self.base_url)
    }

    async fn call<Req, Resp>(&self, route: &str, req: &Req, ttl: Duration) -> Result<Resp, RpcFailure>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = self.url(route);
        trace!(target_node = self.target, %url, "raft rpc");

        let response = self
            .client
            .post(&url)
            .timeout(ttl)
            .json(req)
            .send()
            .await
            .map_err(RpcFailure::Unreachable)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcFailure::Remote(format!("{url} answered {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| RpcFailure::Remote(format!("bad reply from {url}: {e}")))
    }
}

impl RaftNetwork<TypeConfig> for HttpNetwork {
    async fn append_entries(
        &mut self,
        req: AppendEntriesRequest<TypeConfig>,
        option: RPCOption,
    ) -> Result<AppendEntriesResponse<NodeId>, RPCError<NodeId, Member, RaftError<NodeId>>> {
        Ok(self.call("append_entries", &req, option.hard_ttl()).await?)
    }

    async fn install_snapshot(
        &mut self,
        req: InstallSnapshotRequest<TypeConfig>,
        option: RPCOption,
    ) -> Result<
        InstallSnapshotResponse<NodeId>,
        RPCError<NodeId, Member, RaftError<NodeId, InstallSnapshotError>>,
    > {
        Ok(self.call("install_snapshot", &req, option.hard_ttl()).await?)
    }

    async fn vote(
        &mut self,
        req: VoteRequest<NodeId>,
        option: RPCOption,
    ) -> Result<VoteResponse<NodeId>, RPCError<NodeId, Member, RaftError<NodeId>>> {
        Ok(self.call("vote", &req, option.hard_ttl()).await?)
    }
}
