//! Node configuration: Raft settings plus how to run the SQL engine.

use executor::ExecutorConfig;
use raft::NodeConfig;
use std::time::Duration;

/// Default bound on how long a client waits for its command to commit.
pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Everything needed to start one node.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub node: NodeConfig,
    /// SQL engine binary.
    pub engine: String,
    /// Engine arguments placed before the store path.
    pub engine_args: Vec<String>,
    pub commit_timeout: Duration,
}

impl ServerConfig {
    pub fn new(node: NodeConfig) -> Self {
        Self {
            node,
            engine: "sqlite3".to_string(),
            engine_args: Vec::new(),
            commit_timeout: DEFAULT_COMMIT_TIMEOUT,
        }
    }

    /// Run `program args.. <store>` instead of `sqlite3 <store>`.
    pub fn with_engine(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.engine = program.into();
        self.engine_args = args;
        self
    }

    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    /// Executor settings for this node's store.
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig::builder()
            .store_path(self.node.store_path())
            .program(self.engine.clone())
            .args(self.engine_args.clone())
            .build()
    }
}
