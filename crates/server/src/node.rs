//! Node lifecycle: open the store and the Raft log, serve HTTP, then join an
//! existing cluster, bootstrap a new one, or carry on from the recovered log.

use crate::config::ServerConfig;
use crate::error::NodeError;
use crate::join::{JOIN_BACKOFF, join_cluster};
use crate::router::{AppState, router};
use common::transport;
use executor::Executor;
use openraft::error::Fatal;
use raft::{Consensus, ConsensusError, NodeId, RaftConsensus, RaftHttpState};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How long shutdown waits for open connections to drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A running node.
pub struct Node {
    local_addr: SocketAddr,
    consensus: Arc<RaftConsensus>,
    executor: Arc<Executor>,
    shutdown_tx: oneshot::Sender<()>,
    server: JoinHandle<io::Result<()>>,
}

impl Node {
    /// Bind `config.node.listen_addr` and start the node on it.
    pub async fn start(config: ServerConfig) -> Result<Self, NodeError> {
        let addr = config.node.listen_addr.clone();
        if transport::is_socket_path(&addr) {
            return Err(NodeError::UnsupportedListen(addr));
        }

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| NodeError::Bind { addr, source })?;
        Self::start_with_listener(config, listener).await
    }

    /// Start the node on an already bound listener.
    ///
    /// Returns once the node has joined, bootstrapped, or recovered.
    pub async fn start_with_listener(
        config: ServerConfig,
        listener: TcpListener,
    ) -> Result<Self, NodeError> {
        let local_addr = listener.local_addr()?;

        let executor = Arc::new(Executor::open(config.executor_config())?);
        let consensus = Arc::new(RaftConsensus::open(&config.node, executor.clone()).await?);
        let log_empty = consensus.is_log_empty().await;

        if config.node.join.is_some() && !log_empty {
            consensus.shutdown().await;
            return Err(NodeError::ExistingLog);
        }

        let app = router(AppState::new(
            consensus.clone() as Arc<dyn Consensus>,
            config.commit_timeout,
        ))
        .merge(raft::create_router(RaftHttpState::new(consensus.raft())));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });
        info!(name = %config.node.name, %local_addr, "listening");

        let node = Self {
            local_addr,
            consensus,
            executor,
            shutdown_tx,
            server,
        };

        match &config.node.join {
            Some(target) => {
                let client = reqwest::Client::builder()
                    .build()
                    .map_err(ConsensusError::Network)?;
                let member = node.consensus.member().clone();
                join_cluster(&client, target, &member, JOIN_BACKOFF).await?;
            }
            None if log_empty => node.consensus.bootstrap().await?,
            None => info!(name = %config.node.name, "recovered from log"),
        }

        Ok(node)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn consensus(&self) -> &Arc<RaftConsensus> {
        &self.consensus
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// Resolve when the Raft node stops on a fatal error.
    pub async fn fatal(&self) -> Fatal<NodeId> {
        let fatal = self.consensus.fatal().await;
        error!(error = %fatal, "raft node stopped");
        fatal
    }

    /// Stop serving and shut the Raft node down.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        self.consensus.shutdown().await;
        let mut server = self.server;
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => error!(error = %e, "http server failed"),
            Ok(Err(e)) => error!(error = %e, "http server task failed"),
            Err(_) => {
                warn!("connections still open after shutdown, aborting server");
                server.abort();
            }
        }
        info!(addr = %self.local_addr, "node stopped");
    }
}
