//! Persistent Raft storage implementation.
//!
//! The Raft log and the Raft state survive restarts; the state machine does
//! not. On open, the store reports nothing applied, and OpenRaft re-applies
//! every committed entry through the [`ApplyHandler`] against a fresh SQL
//! store.
//!
//! ## File Layout
//!
//! ```text
//! {data_dir}/
//! ├── raft.log           # Append-only log entries
//! └── raft_state.json    # Vote, committed and purged log ids
//! ```
//!
//! Snapshots are built and installed in memory only.
//!
//! ## Log File Format
//!
//! `raft.log` is a sequence of frames, one per entry:
//!
//! ```text
//! [len: u32 LE][crc32(payload): u32 LE][payload: bincode Entry]
//! ```
//!
//! Scanning stops at the first short or mismatched frame; everything from
//! there on is cut off before the next append.
//!
//! An entry whose index is not greater than the previous one in the file
//! replaces it and everything after it, mirroring how conflicting entries
//! were truncated before the rewrite.

use crate::state_machine::{decode_image, encode_image, ApplyHandler, StateMachineData, StoredSnapshot};
use crate::type_config::{Entry, LogId, SnapshotMeta, StoredMembership, TypeConfig, Vote};
use crate::{CommandResponse, NodeId};

use openraft::storage::{LogState, RaftLogReader, RaftSnapshotBuilder, Snapshot};
use openraft::{
    EntryPayload, OptionalSend, RaftStorage, RaftTypeConfig, StorageError, StorageIOError,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Write};
use std::ops::RangeBounds;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Name of the log file inside the data directory.
pub const LOG_FILE: &str = "raft.log";

/// Name of the state file inside the data directory.
pub const STATE_FILE: &str = "raft_state.json";

/// Bytes before each payload: length then checksum.
const FRAME_PREFIX: usize = 8;

/// Persistent state stored in `raft_state.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct RaftState {
    /// Current vote (term and candidate voted for)
    vote: Option<Vote>,
    /// Committed log ID; everything up to it is re-applied on open
    committed: Option<LogId>,
    /// Last purged log ID (entries before this are compacted)
    last_purged_log_id: Option<LogId>,
    /// Snapshot index counter for unique IDs
    snapshot_idx: u64,
}

fn write_frame(writer: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "log entry too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&crc32fast::hash(payload).to_le_bytes())?;
    writer.write_all(payload)
}

/// Next intact payload, or `None` at end of file or at a damaged frame.
fn read_frame(reader: &mut impl Read) -> io::Result<Option<Vec<u8>>> {
    let mut prefix = [0u8; FRAME_PREFIX];
    match reader.read_exact(&mut prefix) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let [l0, l1, l2, l3, c0, c1, c2, c3] = prefix;
    let len = u32::from_le_bytes([l0, l1, l2, l3]) as usize;
    let crc = u32::from_le_bytes([c0, c1, c2, c3]);

    let mut payload = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut payload)?;
    if payload.len() != len || crc32fast::hash(&payload) != crc {
        return Ok(None);
    }
    Ok(Some(payload))
}

/// Persistent Raft storage that survives restarts.
///
/// This implementation persists:
/// - Log entries to `raft.log` (append-only with checksums)
/// - Vote, committed and purged ids to `raft_state.json` (atomic updates)
///
/// Committed entries are applied through the [`ApplyHandler`].
pub struct PersistentRaftStore {
    /// Directory containing all Raft files
    data_dir: PathBuf,

    /// Log entries by index, loaded from `raft.log` on open
    log: RwLock<BTreeMap<u64, Entry>>,

    /// Last purged log ID
    last_purged_log_id: RwLock<Option<LogId>>,

    /// In-memory state machine progress
    sm: RwLock<StateMachineData>,

    /// Current vote (cached from state file)
    vote: RwLock<Option<Vote>>,

    /// Committed log ID (cached from state file)
    committed: RwLock<Option<LogId>>,

    /// Most recent snapshot, in memory only
    current_snapshot: RwLock<Option<StoredSnapshot>>,

    /// Snapshot counter for unique IDs
    snapshot_idx: RwLock<u64>,

    /// Receives every committed command
    handler: Arc<dyn ApplyHandler>,
}

impl PersistentRaftStore {
    /// Open or create persistent storage at the given directory.
    ///
    /// On startup:
    /// 1. Creates the directory if needed
    /// 2. Loads state from `raft_state.json`
    /// 3. Rebuilds the log by scanning `raft.log`
    pub fn open(data_dir: impl AsRef<Path>, handler: Arc<dyn ApplyHandler>) -> io::Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let state_path = data_dir.join(STATE_FILE);
        let state: RaftState = if state_path.exists() {
            let contents = fs::read_to_string(&state_path)?;
            serde_json::from_str(&contents)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        } else {
            RaftState::default()
        };

        let log = Self::rebuild_log(&data_dir.join(LOG_FILE), state.last_purged_log_id)?;
        if !log.is_empty() {
            info!(
                entries = log.len(),
                committed = ?state.committed.map(|id| id.index),
                "recovered raft log"
            );
        }

        Ok(Self {
            data_dir,
            log: RwLock::new(log),
            last_purged_log_id: RwLock::new(state.last_purged_log_id),
            sm: RwLock::new(StateMachineData::default()),
            vote: RwLock::new(state.vote),
            committed: RwLock::new(state.committed),
            current_snapshot: RwLock::new(None),
            snapshot_idx: RwLock::new(state.snapshot_idx),
            handler,
        })
    }

    /// True when nothing was ever appended to (or purged from) the log.
    pub async fn is_log_empty(&self) -> bool {
        self.log.read().await.is_empty() && self.last_purged_log_id.read().await.is_none()
    }

    /// Rebuild the log by scanning the log file.
    fn rebuild_log(log_path: &Path, last_purged: Option<LogId>) -> io::Result<BTreeMap<u64, Entry>> {
        let mut log = BTreeMap::new();

        if !log_path.exists() {
            return Ok(log);
        }

        let file = File::open(log_path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let config = bincode::config::legacy();
        let mut valid_len = 0u64;

        while let Some(payload) = read_frame(&mut reader)? {
            valid_len += (FRAME_PREFIX + payload.len()) as u64;

            let (entry, _): (Entry, usize) =
                bincode::serde::decode_from_slice(&payload, config)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let index = entry.log_id.index;
            if last_purged.is_some_and(|purged| index <= purged.index) {
                continue;
            }

            // A rewrite at this index supersedes the old suffix.
            if log.last_key_value().is_some_and(|(&last, _)| last >= index) {
                log.retain(|&i, _| i < index);
            }
            log.insert(index, entry);
        }

        // Drop a torn tail so later appends stay reachable.
        if valid_len < file_len {
            warn!(
                path = %log_path.display(),
                discarded = file_len - valid_len,
                "truncating damaged raft log tail"
            );
            OpenOptions::new().write(true).open(log_path)?.set_len(valid_len)?;
        }

        Ok(log)
    }

    /// Save the current state to `raft_state.json` atomically.
    fn save_state(&self, state: &RaftState) -> io::Result<()> {
        let state_path = self.data_dir.join(STATE_FILE);
        let temp_path = self.data_dir.join(format!("{STATE_FILE}.tmp"));

        let contents = serde_json::to_string_pretty(state).map_err(io::Error::other)?;
        fs::write(&temp_path, &contents)?;

        let file = File::open(&temp_path)?;
        file.sync_all()?;

        fs::rename(&temp_path, &state_path)?;

        let dir = File::open(&self.data_dir)?;
        dir.sync_all()?;

        Ok(())
    }

    /// Append entries to the log file and fsync once.
    fn append_entries_to_file(&self, entries: &[Entry]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.data_dir.join(LOG_FILE))?;

        let config = bincode::config::legacy();
        {
            let mut writer = BufWriter::new(&mut file);
            for entry in entries {
                let payload =
                    bincode::serde::encode_to_vec(entry, config).map_err(io::Error::other)?;
                write_frame(&mut writer, &payload)?;
            }
            writer.flush()?;
        }

        file.sync_all()
    }

    async fn current_state(&self) -> RaftState {
        RaftState {
            vote: *self.vote.read().await,
            committed: *self.committed.read().await,
            last_purged_log_id: *self.last_purged_log_id.read().await,
            snapshot_idx: *self.snapshot_idx.read().await,
        }
    }
}

impl RaftLogReader<TypeConfig> for Arc<PersistentRaftStore> {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + OptionalSend>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry>, StorageError<NodeId>> {
        let log = self.log.read().await;
        Ok(log.range(range).map(|(_, e)| e.clone()).collect())
    }
}

impl RaftSnapshotBuilder<TypeConfig> for Arc<PersistentRaftStore> {
    async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<NodeId>> {
        let (last_applied_log, last_membership) = {
            let sm = self.sm.read().await;
            (sm.last_applied_log, sm.last_membership.clone())
        };

        let image = self
            .handler
            .snapshot()
            .await
            .map_err(|e| StorageIOError::read_state_machine(&e))?;
        let data = encode_image(&image).map_err(|e| StorageIOError::read_state_machine(&e))?;

        let snapshot_idx = {
            let mut idx = self.snapshot_idx.write().await;
            *idx += 1;
            *idx
        };

        let snapshot_id = match last_applied_log {
            Some(last) => format!("{}_{}_{}", last.leader_id.term, last.index, snapshot_idx),
            None => format!("0_0_{snapshot_idx}"),
        };

        let meta = SnapshotMeta {
            last_log_id: last_applied_log,
            last_membership,
            snapshot_id,
        };

        let state = self.current_state().await;
        self.save_state(&state)
            .map_err(|e| StorageIOError::write_snapshot(Some(meta.signature()), &e))?;

        *self.current_snapshot.write().await = Some(StoredSnapshot {
            meta: meta.clone(),
            data: data.clone(),
        });

        Ok(Snapshot {
            meta,
            snapshot: Box::new(Cursor::new(data)),
        })
    }
}

impl RaftStorage<TypeConfig> for Arc<PersistentRaftStore> {
    type LogReader = Self;
    type SnapshotBuilder = Self;

    async fn get_log_reader(&mut self) -> Self::LogReader {
        self.clone()
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        self.clone()
    }

    async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError<NodeId>> {
        let last_log_id = self.log.read().await.values().next_back().map(|e| e.log_id);
        let last_purged = *self.last_purged_log_id.read().await;

        Ok(LogState {
            last_purged_log_id: last_purged,
            last_log_id: last_log_id.or(last_purged),
        })
    }

    async fn save_vote(&mut self, vote: &Vote) -> Result<(), StorageError<NodeId>> {
        *self.vote.write().await = Some(*vote);

        let state = self.current_state().await;
        self.save_state(&state)
            .map_err(|e| StorageIOError::write_vote(&e))?;

        Ok(())
    }

    async fn read_vote(&mut self) -> Result<Option<Vote>, StorageError<NodeId>> {
        Ok(*self.vote.read().await)
    }

    async fn save_committed(
        &mut self,
        committed: Option<LogId>,
    ) -> Result<(), StorageError<NodeId>> {
        *self.committed.write().await = committed;

        let state = self.current_state().await;
        self.save_state(&state)
            .map_err(|e| StorageIOError::write_state_machine(&e))?;

        Ok(())
    }

    async fn read_committed(&mut self) -> Result<Option<LogId>, StorageError<NodeId>> {
        Ok(*self.committed.read().await)
    }

    async fn last_applied_state(
        &mut self,
    ) -> Result<(Option<LogId>, StoredMembership), StorageError<NodeId>> {
        let sm = self.sm.read().await;
        Ok((sm.last_applied_log, sm.last_membership.clone()))
    }

    async fn delete_conflict_logs_since(
        &mut self,
        log_id: LogId,
    ) -> Result<(), StorageError<NodeId>> {
        // The file is not truncated: the replacement entries appended next
        // supersede the old suffix when the log is rebuilt.
        self.log.write().await.retain(|&index, _| index < log_id.index);
        Ok(())
    }

    async fn purge_logs_upto(&mut self, log_id: LogId) -> Result<(), StorageError<NodeId>> {
        *self.last_purged_log_id.write().await = Some(log_id);

        {
            let mut log = self.log.write().await;
            let kept = log.split_off(&(log_id.index + 1));
            *log = kept;
        }

        let state = self.current_state().await;
        self.save_state(&state)
            .map_err(|e| StorageIOError::write_logs(&e))?;

        Ok(())
    }

    async fn append_to_log<I>(&mut self, entries: I) -> Result<(), StorageError<NodeId>>
    where
        I: IntoIterator<Item = Entry> + OptionalSend,
    {
        let entries: Vec<Entry> = entries.into_iter().collect();
        if entries.is_empty() {
            return Ok(());
        }

        let mut log = self.log.write().await;
        self.append_entries_to_file(&entries)
            .map_err(|e| StorageIOError::write_logs(&e))?;

        for entry in entries {
            log.insert(entry.log_id.index, entry);
        }

        Ok(())
    }

    async fn apply_to_state_machine(
        &mut self,
        entries: &[Entry],
    ) -> Result<Vec<CommandResponse>, StorageError<NodeId>> {
        let mut res = Vec::with_capacity(entries.len());
        let mut sm = self.sm.write().await;

        for entry in entries {
            match &entry.payload {
                EntryPayload::Blank => res.push(CommandResponse::Empty),
                EntryPayload::Normal(cmd) => {
                    let response = self.handler.apply(cmd).await.map_err(|e| {
                        error!(index = entry.log_id.index, error = %e, "failed to apply entry");
                        StorageIOError::apply(entry.log_id, &e)
                    })?;
                    res.push(response);
                }
                EntryPayload::Membership(mem) => {
                    sm.last_membership = StoredMembership::new(Some(entry.log_id), mem.clone());
                    res.push(CommandResponse::Empty);
                }
            }
            sm.last_applied_log = Some(entry.log_id);
        }

        Ok(res)
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<<TypeConfig as RaftTypeConfig>::SnapshotData>, StorageError<NodeId>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta,
        snapshot: Box<<TypeConfig as RaftTypeConfig>::SnapshotData>,
    ) -> Result<(), StorageError<NodeId>> {
        let data = snapshot.into_inner();

        let image = decode_image(&data)
            .map_err(|e| StorageIOError::read_snapshot(Some(meta.signature()), &e))?;
        self.handler
            .restore(image)
            .await
            .map_err(|e| StorageIOError::write_state_machine(&e))?;

        *self.sm.write().await = StateMachineData {
            last_applied_log: meta.last_log_id,
            last_membership: meta.last_membership.clone(),
        };

        *self.current_snapshot.write().await = Some(StoredSnapshot {
            meta: meta.clone(),
            data,
        });

        Ok(())
    }

    async fn get_current_snapshot(
        &mut self,
    ) -> Result<Option<Snapshot<TypeConfig>>, StorageError<NodeId>> {
        let current_snapshot = self.current_snapshot.read().await;
        Ok(current_snapshot.as_ref().map(|snapshot| Snapshot {
            meta: snapshot.meta.clone(),
            snapshot: Box::new(Cursor::new(snapshot.data.clone())),
        }))
    }
}
