//! Memoizing command executor: the node-local state machine.
//!
//! An [`Executor`] owns one store file, a sequence counter, and a cache of
//! every command it has ever run. Each distinct command text is executed
//! against the external SQL engine exactly once; repeats are answered from
//! the cache with the output (and sequence number) of the first run.
//!
//! # Architecture
//!
//! ```text
//! execute(text)
//!     ↓
//! lock ──▶ cache hit? ──yes──▶ cached Output
//!     │no
//!     ▼
//! spawn engine, feed text + terminator, drain stdout/stderr, wait
//!     ↓
//! classify exit status (0 / 1,2 / other)
//!     ↓
//! stamp sequence number, cache, increment, unlock
//! ```
//!
//! # Example
//!
//! ```no_run
//! use executor::{Executor, ExecutorConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = Executor::open(
//!     ExecutorConfig::builder()
//!         .store_path("/tmp/node0/storage.sql")
//!         .build(),
//! )?;
//!
//! let output = executor.execute("CREATE TABLE t (a INT)").await?;
//! assert_eq!(output.sequence_number, 0);
//! # Ok(())
//! # }
//! ```


pub mod config;
mod engine;
pub mod error;

pub use config::ExecutorConfig;
pub use error::ExecutorError;

use engine::ExitClass;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error};

/// The result of running one command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// User-visible payload. For engine-level query errors this is the
    /// engine's diagnostic text.
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Counter value at the time the command first ran on this node.
    pub sequence_number: u64,
}

impl Output {
    /// Render as `SequenceNumber: <n>\n<stdout>`.
    pub fn to_response(&self) -> Vec<u8> {
        let mut response = format!("SequenceNumber: {}\n", self.sequence_number).into_bytes();
        response.extend_from_slice(&self.stdout);
        response
    }
}

/// Contents of the store plus the counter, as carried by snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreImage {
    pub sequence_number: u64,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct ExecutorState {
    sequence_number: u64,
    /// Exact command text -> first output. Never evicted.
    history: HashMap<String, Arc<Output>>,
}

/// Executes commands against one store, at most once per distinct text.
pub struct Executor {
    config: ExecutorConfig,
    state: Mutex<ExecutorState>,
}

impl Executor {
    /// Create an executor over a fresh store.
    ///
    /// Any existing store file is removed: the store is rebuilt from the
    /// replicated log, never reused across restarts.
    pub fn open(config: ExecutorConfig) -> io::Result<Self> {
        ensure_absent(&config.store_path)?;
        if let Some(parent) = config.store_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Ok(Self {
            config,
            state: Mutex::new(ExecutorState::default()),
        })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute `command`, or return its cached output.
    ///
    /// Errors are reserved for a broken environment (the engine cannot be
    /// started, or exits with an unrecognized status); nothing is cached and
    /// the counter is untouched in that case.
    pub async fn execute(&self, command: &str) -> Result<Arc<Output>, ExecutorError> {
        let mut state = self.state.lock().await;

        if let Some(output) = state.history.get(command) {
            debug!(command, sequence_number = output.sequence_number, "cached command");
            return Ok(Arc::clone(output));
        }

        let sequence_number = state.sequence_number;
        debug!(sequence_number, command, "executing");

        let run = engine::run(&self.config, command).await?;
        let (stdout, stderr) = match engine::classify(run.status.code()) {
            ExitClass::Success => (run.stdout, run.stderr),
            ExitClass::QueryError => (run.stderr, Vec::new()),
            ExitClass::Abnormal => {
                error!(command, status = %run.status, "SQL engine exited abnormally");
                return Err(ExecutorError::Abnormal {
                    command: command.to_string(),
                    status: run.status.to_string(),
                    stderr: run.stderr,
                });
            }
        };

        let output = Arc::new(Output {
            stdout,
            stderr,
            sequence_number,
        });
        state
            .history
            .insert(command.to_string(), Arc::clone(&output));
        state.sequence_number += 1;

        Ok(output)
    }

    /// The sequence number the next fresh command will receive.
    pub async fn sequence_number(&self) -> u64 {
        self.state.lock().await.sequence_number
    }

    /// Number of distinct commands executed so far.
    pub async fn cached_commands(&self) -> usize {
        self.state.lock().await.history.len()
    }

    /// Capture the store file and counter.
    pub async fn snapshot(&self) -> io::Result<StoreImage> {
        let state = self.state.lock().await;
        let bytes = match tokio::fs::read(&self.config.store_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        Ok(StoreImage {
            sequence_number: state.sequence_number,
            bytes,
        })
    }

    /// Replace the store file and counter with `image`.
    ///
    /// The cache is kept: commands already seen are still answered from it.
    pub async fn restore(&self, image: StoreImage) -> io::Result<()> {
        let mut state = self.state.lock().await;
        if image.bytes.is_empty() {
            ensure_absent(&self.config.store_path)?;
        } else {
            tokio::fs::write(&self.config.store_path, &image.bytes).await?;
        }
        state.sequence_number = image.sequence_number;
        Ok(())
    }
}

fn ensure_absent(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
