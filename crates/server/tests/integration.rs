//! End-to-end tests for the node.
//!
//! Each test starts real nodes on ephemeral ports with a scripted SQL engine,
//! then drives them over HTTP with the public `client` library.

use client::{Client, ClientError};
use common::Role;
use raft::{Consensus, NodeConfig};
use server::{Node, NodeError, ServerConfig};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use testsupport::prelude::*;
use tokio::net::TcpListener;

const SETTLE: Duration = Duration::from_secs(10);

struct NodeOptions<'a> {
    name: Option<&'a str>,
    join: Option<String>,
    commit_timeout: Duration,
}

impl Default for NodeOptions<'_> {
    fn default() -> Self {
        Self {
            name: None,
            join: None,
            commit_timeout: Duration::from_secs(2),
        }
    }
}

async fn try_start(
    engine: &ScriptedEngine,
    data_dir: &Path,
    options: NodeOptions<'_>,
) -> Result<Node, NodeError> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let mut node = NodeConfig::new(data_dir, addr).unwrap();
    if let Some(name) = options.name {
        node = node.with_name(name);
    }
    if let Some(target) = options.join {
        node = node.with_join(target);
    }
    let config = ServerConfig::new(node)
        .with_engine(engine.program(), engine.args())
        .with_commit_timeout(options.commit_timeout);

    Node::start_with_listener(config, listener).await
}

async fn start(engine: &ScriptedEngine, data_dir: &Path, options: NodeOptions<'_>) -> Node {
    match try_start(engine, data_dir, options).await {
        Ok(node) => node,
        Err(e) => panic!("node failed to start: {e}"),
    }
}

async fn wait_for_leader(node: &Node) {
    assert!(
        wait_until(SETTLE, || async { node.consensus().role() == Role::Leader }).await,
        "node never became leader"
    );
}

fn client_for(node: &Node) -> Client {
    Client::connect(&node.local_addr().to_string()).unwrap()
}

#[tokio::test]
async fn single_node_end_to_end() {
    let engine = ScriptedEngine::new().unwrap();
    let dir = TempDir::new().unwrap();
    let node = start(&engine, dir.path(), NodeOptions::default()).await;
    wait_for_leader(&node).await;
    let client = client_for(&node);

    assert!(client.health().await.unwrap());

    let created = client.execute("CREATE TABLE t (a INT)").await.unwrap();
    assert_eq!(created.sequence_number, 0);
    assert!(created.is_empty());

    let inserted = client.execute("INSERT INTO t VALUES (1)").await.unwrap();
    assert_eq!(inserted.sequence_number, 1);

    // Same text again: answered from the cache, not run twice.
    let repeated = client.execute("INSERT INTO t VALUES (1)").await.unwrap();
    assert_eq!(repeated.sequence_number, 1);

    let selected = client.execute("SELECT * FROM t").await.unwrap();
    assert_eq!(selected.sequence_number, 2);
    assert_eq!(
        selected.rows().collect::<Vec<_>>(),
        vec!["INSERT INTO t VALUES (1);"]
    );

    // Engine-level errors are output, not failures.
    let failed = client.execute("FAIL SELEC").await.unwrap();
    assert_eq!(failed.sequence_number, 3);
    assert!(failed.output.contains("syntax error"));

    let store = dir.path().join("storage.sql");
    assert_eq!(ScriptedEngine::invocations(&store).len(), 4);

    let status = client.status().await.unwrap();
    assert_eq!(status.role, Role::Leader);
    assert_eq!(status.leader.map(|m| m.name), Some(status.name));
    assert!(status.peers.is_empty());

    node.shutdown().await;
}

#[tokio::test]
async fn timed_out_statement_still_applies() {
    let engine = ScriptedEngine::new().unwrap();
    let dir = TempDir::new().unwrap();
    let options = NodeOptions {
        commit_timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let node = start(&engine, dir.path(), options).await;
    wait_for_leader(&node).await;
    let client = client_for(&node);

    let err = client.execute("SLOW 1").await.unwrap_err();
    assert_eq!(err.cluster_message(), Some("Timeout"));

    let executor = node.executor().clone();
    assert!(
        wait_until(SETTLE, || async { executor.sequence_number().await == 1 }).await,
        "timed out statement was never applied"
    );

    // Now cached: answered without running the engine again.
    let result = client.execute("SLOW 1").await.unwrap();
    assert_eq!(result.sequence_number, 0);
    let store = dir.path().join("storage.sql");
    assert_eq!(ScriptedEngine::invocations(&store), vec!["SLOW 1;"]);

    node.shutdown().await;
}

#[tokio::test]
async fn restart_recovers_and_refuses_to_join() {
    let engine = ScriptedEngine::new().unwrap();
    let dir = TempDir::new().unwrap();
    let named = || NodeOptions {
        name: Some("node0"),
        ..Default::default()
    };

    let node = start(&engine, dir.path(), named()).await;
    wait_for_leader(&node).await;
    let client = client_for(&node);
    client.execute("INSERT INTO t VALUES (1)").await.unwrap();
    client.execute("INSERT INTO t VALUES (2)").await.unwrap();
    node.shutdown().await;

    let refused = try_start(
        &engine,
        dir.path(),
        NodeOptions {
            join: Some("127.0.0.1:1".to_string()),
            ..named()
        },
    )
    .await;
    assert!(matches!(refused, Err(NodeError::ExistingLog)));

    let node = start(&engine, dir.path(), named()).await;
    wait_for_leader(&node).await;
    let executor = node.executor().clone();
    assert!(wait_until(SETTLE, || async { executor.sequence_number().await == 2 }).await);

    let client = client_for(&node);
    let selected = client.execute("SELECT * FROM t").await.unwrap();
    assert_eq!(selected.sequence_number, 2);
    assert_eq!(
        selected.rows().collect::<Vec<_>>(),
        vec!["INSERT INTO t VALUES (1);", "INSERT INTO t VALUES (2);"]
    );

    node.shutdown().await;
}

#[tokio::test]
async fn three_node_cluster_redirects_to_leader() {
    let engine = ScriptedEngine::new().unwrap();
    let dir = TempDir::new().unwrap();

    let leader = start(&engine, &dir.path().join("node0"), NodeOptions::default()).await;
    wait_for_leader(&leader).await;
    let target = leader.local_addr().to_string();

    let mut followers = Vec::new();
    for name in ["node1", "node2"] {
        let options = NodeOptions {
            join: Some(target.clone()),
            ..Default::default()
        };
        followers.push(start(&engine, &dir.path().join(name), options).await);
    }

    let leader_member = leader.consensus().member().clone();
    for follower in &followers {
        let consensus = follower.consensus();
        assert!(
            wait_until(SETTLE, || async {
                consensus.leader().as_ref() == Some(&leader_member)
                    && consensus.peers().len() == 2
            })
            .await,
            "follower never saw the full cluster"
        );
    }

    let via_follower = client_for(&followers[0]);
    let inserted = via_follower.execute("INSERT INTO t VALUES (1)").await.unwrap();
    assert_eq!(inserted.sequence_number, 0);

    let via_other = client_for(&followers[1]);
    let selected = via_other.execute("SELECT * FROM t").await.unwrap();
    assert_eq!(selected.sequence_number, 1);
    assert_eq!(selected.rows().count(), 1);

    // Every node applies the same history to its own store.
    for node in followers.iter().chain([&leader]) {
        let executor = node.executor().clone();
        assert!(wait_until(SETTLE, || async { executor.sequence_number().await == 2 }).await);
    }
    let stores: Vec<Vec<u8>> = ["node0", "node1", "node2"]
        .iter()
        .map(|name| std::fs::read(dir.path().join(name).join("storage.sql")).unwrap())
        .collect();
    assert_eq!(stores[0], b"INSERT INTO t VALUES (1);\n");
    assert!(stores.iter().all(|store| store == &stores[0]));

    for node in followers {
        node.shutdown().await;
    }
    leader.shutdown().await;
}

#[tokio::test]
async fn engine_crash_stops_the_node() {
    let engine = ScriptedEngine::new().unwrap();
    let dir = TempDir::new().unwrap();
    let node = start(&engine, dir.path(), NodeOptions::default()).await;
    wait_for_leader(&node).await;
    let client = client_for(&node);

    client.execute("INSERT INTO t VALUES (1)").await.unwrap();
    let err = client.execute("CRASH now").await.unwrap_err();
    assert!(matches!(err, ClientError::Cluster(_)));

    tokio::time::timeout(SETTLE, node.fatal())
        .await
        .expect("node kept running after the engine crashed");
    node.shutdown().await;
}

#[tokio::test]
async fn socket_listen_address_is_rejected() {
    let engine = ScriptedEngine::new().unwrap();
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("node0").join("node0.sock");

    assert!(NodeConfig::new(dir.path().join("node0"), socket.display().to_string()).is_err());

    // A hand-built config still never reaches bind.
    let node = NodeConfig {
        data_dir: dir.path().join("node0"),
        listen_addr: socket.display().to_string(),
        ..Default::default()
    }
    .with_name("node0");
    let config = ServerConfig::new(node).with_engine(engine.program(), engine.args());

    let result = Node::start(config).await;
    assert!(matches!(result, Err(NodeError::UnsupportedListen(_))));
}
