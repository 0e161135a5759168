//! Raft state machine integration.
//!
//! The state machine proper is the [`Executor`]: the storage layer hands every
//! committed [`Command`] to an [`ApplyHandler`] in log order and records only
//! its own progress (last applied id and membership) in memory.
//!
//! Neither side is persisted. On restart the executor starts from an empty
//! store and OpenRaft re-applies the committed log, which reproduces the same
//! sequence numbers.

use crate::type_config::{LogId, SnapshotMeta, StoredMembership};
use crate::{Command, CommandResponse};
use async_trait::async_trait;
use executor::{Executor, ExecutorError, StoreImage};
use std::io;

/// Applies committed commands to node-local state.
///
/// An error from [`apply`](ApplyHandler::apply) means the node can no longer
/// apply entries safely; the storage layer reports it to OpenRaft as a fatal
/// storage error.
#[async_trait]
pub trait ApplyHandler: Send + Sync + 'static {
    async fn apply(&self, command: &Command) -> Result<CommandResponse, ExecutorError>;

    /// Capture state for a snapshot.
    async fn snapshot(&self) -> io::Result<StoreImage>;

    /// Replace state with a snapshot's contents.
    async fn restore(&self, image: StoreImage) -> io::Result<()>;
}

#[async_trait]
impl ApplyHandler for Executor {
    async fn apply(&self, command: &Command) -> Result<CommandResponse, ExecutorError> {
        let output = self.execute(command.query()).await?;
        Ok(CommandResponse::Output(output.as_ref().clone()))
    }

    async fn snapshot(&self) -> io::Result<StoreImage> {
        Executor::snapshot(self).await
    }

    async fn restore(&self, image: StoreImage) -> io::Result<()> {
        Executor::restore(self, image).await
    }
}

/// Progress of the state machine as OpenRaft sees it.
#[derive(Debug, Default, Clone)]
pub struct StateMachineData {
    pub last_applied_log: Option<LogId>,
    pub last_membership: StoredMembership,
}

/// Snapshot kept in memory after it is built or installed.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub meta: SnapshotMeta,
    pub data: Vec<u8>,
}

/// Encode a store image as snapshot data.
pub fn encode_image(image: &StoreImage) -> io::Result<Vec<u8>> {
    bincode::serde::encode_to_vec(image, bincode::config::legacy()).map_err(io::Error::other)
}

/// Decode snapshot data back into a store image.
pub fn decode_image(data: &[u8]) -> io::Result<StoreImage> {
    let (image, _): (StoreImage, usize) =
        bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(image)
}
