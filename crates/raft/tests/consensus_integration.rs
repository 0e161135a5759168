//! Integration tests for the consensus adapter.
//!
//! These tests run a real single-node Raft cluster over persistent storage
//! with a scripted SQL engine as the state machine.

use common::{ClusterError, Role};
use executor::{Executor, ExecutorConfig};
use raft::{Command, Consensus, NodeConfig, RaftConsensus};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use testsupport::prelude::*;

fn node_config(dir: &TempDir) -> NodeConfig {
    NodeConfig::new(dir.path().join("node0"), "127.0.0.1:4901").unwrap()
}

fn open_executor(engine: &ScriptedEngine, config: &NodeConfig) -> Arc<Executor> {
    Arc::new(
        Executor::open(
            ExecutorConfig::builder()
                .store_path(config.store_path())
                .program(engine.program())
                .args(engine.args())
                .build(),
        )
        .unwrap(),
    )
}

async fn start_leader(config: &NodeConfig, executor: Arc<Executor>) -> RaftConsensus {
    let consensus = RaftConsensus::open(config, executor).await.unwrap();
    if consensus.is_log_empty().await {
        consensus.bootstrap().await.unwrap();
    }
    assert!(
        wait_until(Duration::from_secs(5), || async { consensus.role() == Role::Leader }).await,
        "node never became leader"
    );
    consensus
}

async fn submit(consensus: &RaftConsensus, query: &str) -> u64 {
    consensus
        .submit(Command::sql(query))
        .await
        .unwrap()
        .output()
        .unwrap()
        .sequence_number
}

#[tokio::test]
async fn single_node_commits_and_reports_itself() {
    let engine = ScriptedEngine::new().unwrap();
    let dir = TempDir::new().unwrap();
    let config = node_config(&dir);
    let executor = open_executor(&engine, &config);

    let consensus = RaftConsensus::open(&config, executor.clone()).await.unwrap();
    assert!(consensus.is_log_empty().await);
    consensus.bootstrap().await.unwrap();
    assert!(
        wait_until(Duration::from_secs(5), || async { consensus.role() == Role::Leader }).await
    );

    assert!(!consensus.is_log_empty().await);
    assert_eq!(consensus.name().as_str(), "127.0.0.1-4901");
    assert_eq!(consensus.leader(), Some(consensus.member().clone()));
    assert!(consensus.peers().is_empty());

    assert_eq!(submit(&consensus, "CREATE TABLE t (a INT)").await, 0);
    assert_eq!(submit(&consensus, "INSERT INTO t VALUES (1)").await, 1);
    // Same text again: answered from the cache.
    assert_eq!(submit(&consensus, "INSERT INTO t VALUES (1)").await, 1);
    assert_eq!(executor.sequence_number().await, 2);

    consensus.shutdown().await;
}

#[tokio::test]
async fn restart_replays_log_into_fresh_store() {
    let engine = ScriptedEngine::new().unwrap();
    let dir = TempDir::new().unwrap();
    let config = node_config(&dir);

    let before = {
        let executor = open_executor(&engine, &config);
        let consensus = start_leader(&config, executor.clone()).await;
        submit(&consensus, "INSERT INTO t VALUES (1)").await;
        submit(&consensus, "INSERT INTO t VALUES (2)").await;
        submit(&consensus, "INSERT INTO t VALUES (1)").await;
        consensus.shutdown().await;
        std::fs::read(config.store_path()).unwrap()
    };

    let executor = open_executor(&engine, &config);
    assert!(!config.store_path().exists());

    let consensus = start_leader(&config, executor.clone()).await;
    assert!(
        wait_until(Duration::from_secs(5), || async { executor.sequence_number().await == 2 }).await,
        "committed entries were not re-applied"
    );
    assert_eq!(std::fs::read(config.store_path()).unwrap(), before);

    // Sequence numbers continue where the replayed log left off.
    assert_eq!(submit(&consensus, "INSERT INTO t VALUES (3)").await, 2);
    assert_eq!(submit(&consensus, "INSERT INTO t VALUES (2)").await, 1);

    consensus.shutdown().await;
}

#[tokio::test]
async fn apply_failure_stops_the_node() {
    let engine = ScriptedEngine::new().unwrap();
    let dir = TempDir::new().unwrap();
    let config = node_config(&dir);
    let executor = open_executor(&engine, &config);
    let consensus = start_leader(&config, executor.clone()).await;

    submit(&consensus, "INSERT INTO t VALUES (1)").await;
    let err = consensus
        .submit(Command::sql("CRASH the engine"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::ApplyRejected(_)));

    let fatal = tokio::time::timeout(Duration::from_secs(5), consensus.fatal())
        .await
        .expect("raft did not stop after apply failure");
    assert!(!fatal.to_string().is_empty());
    assert_eq!(executor.sequence_number().await, 1);
}
