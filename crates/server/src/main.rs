//! `sqlcluster`: run one node of a replicated SQL cluster.

use anyhow::{Context, Result, bail};
use clap::Parser;
use raft::NodeConfig;
use server::{Node, ServerConfig};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_LISTEN: &str = "127.0.0.1:4001";
const DEFAULT_DATA_DIR: &str = "./sqlcluster_data";
const DEFAULT_ENGINE: &str = "sqlite3";

#[derive(Parser, Debug)]
#[command(name = "sqlcluster", about = "Replicated SQL execution over Raft")]
struct Args {
    /// Address to serve HTTP on (host:port)
    #[arg(short, long, default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Directory for the Raft log and the SQL store
    #[arg(short, long, default_value = DEFAULT_DATA_DIR)]
    directory: PathBuf,

    /// Listen address of an existing member to join
    #[arg(short, long)]
    join: Option<String>,

    /// Node name; derived from the listen address when omitted
    #[arg(long)]
    name: Option<String>,

    /// SQL engine binary, invoked as `<engine> <store>`
    #[arg(long, default_value = DEFAULT_ENGINE)]
    engine: String,

    /// Milliseconds a client waits for its statement to commit
    #[arg(long, default_value_t = 500)]
    commit_timeout_ms: u64,

    /// Minimum election timeout in milliseconds; the maximum is twice this
    #[arg(long, default_value_t = 150)]
    election_timeout_ms: u64,

    /// Leader heartbeat interval in milliseconds
    #[arg(long, default_value_t = 50)]
    heartbeat_ms: u64,

    /// Log filter, e.g. `info` or `server=debug,openraft=warn`
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn server_config(&self) -> Result<ServerConfig> {
        let mut node = NodeConfig::new(&self.directory, &self.listen)
            .with_context(|| format!("invalid listen address {}", self.listen))?
            .with_election_timeout(self.election_timeout_ms, self.election_timeout_ms * 2)
            .with_heartbeat_interval(self.heartbeat_ms);
        if let Some(name) = &self.name {
            node = node.with_name(name.as_str());
        }
        if let Some(target) = &self.join {
            node = node.with_join(target.as_str());
        }

        Ok(ServerConfig::new(node)
            .with_engine(self.engine.as_str(), Vec::new())
            .with_commit_timeout(Duration::from_millis(self.commit_timeout_ms)))
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).compact().init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = args.server_config()?;
    info!(
        name = %config.node.name,
        listen = %config.node.listen_addr,
        directory = %config.node.data_dir.display(),
        join = ?config.node.join,
        "starting node"
    );

    let node = Node::start(config).await.context("failed to start node")?;

    let fatal = tokio::select! {
        fatal = node.fatal() => Some(fatal),
        result = signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
            info!("shutdown signal received");
            None
        }
    };

    node.shutdown().await;
    if let Some(fatal) = fatal {
        bail!("raft stopped: {fatal}");
    }
    Ok(())
}
