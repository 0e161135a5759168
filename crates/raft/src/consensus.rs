//! The consensus adapter.
//!
//! [`Consensus`] is the narrow interface the query router needs from the
//! replication layer: who am I, who leads, submit a command, admit a member.
//! [`RaftConsensus`] implements it on top of an OpenRaft node with
//! [`PersistentRaftStore`] storage and the HTTP network.

use crate::config::NodeConfig;
use crate::error::ConsensusError;
use crate::network::HttpNetworkFactory;
use crate::persistent_storage::PersistentRaftStore;
use crate::state_machine::ApplyHandler;
use crate::type_config::TypeConfig;
use crate::{Command, CommandResponse, NodeId, RaftNode};
use async_trait::async_trait;
use common::{ClusterError, ClusterResult, Member, NodeName, Role};
use openraft::error::Fatal;
use openraft::storage::Adaptor;
use openraft::{ChangeMembers, Raft, RaftMetrics, ServerState};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// What the query router needs from the replication layer.
#[async_trait]
pub trait Consensus: Send + Sync + 'static {
    /// Name of the local node.
    fn name(&self) -> &NodeName;

    fn role(&self) -> Role;

    /// The current leader, if known and present in the local membership view.
    fn leader(&self) -> Option<Member>;

    /// Every member except the local node.
    fn peers(&self) -> Vec<Member>;

    async fn is_log_empty(&self) -> bool;

    /// Replicate `command` and return the local state machine's response
    /// once it is committed and applied.
    async fn submit(&self, command: Command) -> ClusterResult<CommandResponse>;

    /// Admit `member` to the cluster as a voter.
    async fn join(&self, member: Member) -> ClusterResult<()>;
}

/// [`Consensus`] backed by an OpenRaft node.
pub struct RaftConsensus {
    name: NodeName,
    id: NodeId,
    member: Member,
    raft: Arc<RaftNode>,
    store: Arc<PersistentRaftStore>,
}

impl RaftConsensus {
    /// Open the Raft log under `config.data_dir` and start the Raft node.
    ///
    /// Committed entries already in the log are re-applied to `handler`
    /// before this returns.
    pub async fn open(
        config: &NodeConfig,
        handler: Arc<dyn ApplyHandler>,
    ) -> Result<Self, ConsensusError> {
        let member = config.member()?;
        let id = config.node_id();
        let raft_config = Arc::new(config.to_openraft_config()?);

        let store = Arc::new(PersistentRaftStore::open(&config.data_dir, handler)?);
        let (log_store, state_machine) =
            Adaptor::<TypeConfig, Arc<PersistentRaftStore>>::new(store.clone());
        let network = HttpNetworkFactory::new()?;

        let raft = Raft::<TypeConfig>::new(id, raft_config, network, log_store, state_machine).await?;

        info!(name = %config.name, id, data_dir = %config.data_dir.display(), "raft node started");

        Ok(Self {
            name: config.name.clone(),
            id,
            member,
            raft: Arc::new(raft),
            store,
        })
    }

    /// Start a new single-member cluster containing only this node.
    pub async fn bootstrap(&self) -> Result<(), ConsensusError> {
        let mut members = BTreeMap::new();
        members.insert(self.id, self.member.clone());

        self.raft
            .initialize(members)
            .await
            .map_err(|e| ConsensusError::Initialize(e.to_string()))?;

        info!(member = %self.member, "initialized new cluster");
        Ok(())
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// This node as it appears in membership.
    pub fn member(&self) -> &Member {
        &self.member
    }

    pub fn raft(&self) -> Arc<RaftNode> {
        Arc::clone(&self.raft)
    }

    /// Resolve once the Raft node has stopped because of a fatal error,
    /// such as a state machine apply failure.
    pub async fn fatal(&self) -> Fatal<NodeId> {
        let mut metrics = self.raft.metrics();
        loop {
            let running_state = metrics.borrow().running_state.clone();
            if let Err(fatal) = running_state {
                return fatal;
            }
            if metrics.changed().await.is_err() {
                return Fatal::Stopped;
            }
        }
    }

    pub async fn shutdown(&self) {
        if let Err(e) = self.raft.shutdown().await {
            warn!(error = %e, "raft shutdown failed");
        }
    }

    fn metrics(&self) -> RaftMetrics<NodeId, Member> {
        self.raft.metrics().borrow().clone()
    }
}

#[async_trait]
impl Consensus for RaftConsensus {
    fn name(&self) -> &NodeName {
        &self.name
    }

    fn role(&self) -> Role {
        match self.raft.metrics().borrow().state {
            ServerState::Leader => Role::Leader,
            ServerState::Follower => Role::Follower,
            ServerState::Candidate => Role::Candidate,
            ServerState::Learner => Role::Learner,
            ServerState::Shutdown => Role::Shutdown,
        }
    }

    fn leader(&self) -> Option<Member> {
        let metrics = self.metrics();
        let leader_id = metrics.current_leader?;
        let leader = metrics
            .membership_config
            .membership()
            .nodes()
            .find(|(id, _)| **id == leader_id)
            .map(|(_, member)| member.clone());
        leader
    }

    fn peers(&self) -> Vec<Member> {
        let metrics = self.metrics();
        metrics
            .membership_config
            .membership()
            .nodes()
            .filter(|(id, _)| **id != self.id)
            .map(|(_, member)| member.clone())
            .collect()
    }

    async fn is_log_empty(&self) -> bool {
        self.store.is_log_empty().await
    }

    async fn submit(&self, command: Command) -> ClusterResult<CommandResponse> {
        match self.raft.client_write(command).await {
            Ok(response) => Ok(response.data),
            Err(e) => {
                warn!(error = %e, "command not committed");
                Err(ClusterError::ApplyRejected(e.to_string()))
            }
        }
    }

    async fn join(&self, member: Member) -> ClusterResult<()> {
        let id = member.node_id();
        let metrics = self.metrics();
        ensure_id_free(metrics.membership_config.membership().nodes(), id, &member)?;
        info!(%member, id, "adding member");

        self.raft
            .add_learner(id, member.clone(), true)
            .await
            .map_err(|e| ClusterError::MembershipRejected(e.to_string()))?;

        self.raft
            .change_membership(ChangeMembers::AddVoterIds(BTreeSet::from([id])), false)
            .await
            .map_err(|e| ClusterError::MembershipRejected(e.to_string()))?;

        info!(%member, "member joined");
        Ok(())
    }
}

/// Refuse `member` when its id already names a member with a different name.
///
/// Ids are hashed from names, so a collision would otherwise replace the
/// existing member in the membership map. Rejoining under the same name is
/// allowed.
fn ensure_id_free<'a>(
    nodes: impl IntoIterator<Item = (&'a NodeId, &'a Member)>,
    id: NodeId,
    member: &Member,
) -> ClusterResult<()> {
    match nodes.into_iter().find(|(existing_id, _)| **existing_id == id) {
        Some((_, existing)) if existing.name != member.name => {
            Err(ClusterError::MembershipRejected(format!(
                "node id {id} of {} is already used by {}",
                member.name, existing.name
            )))
        }
        _ => Ok(()),
    }
}
