//! One run of the external SQL engine.

use crate::{ExecutorConfig, ExecutorError};
use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Everything observed from a finished engine process.
pub(crate) struct EngineRun {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// How an exit status is treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ExitClass {
    Success,
    /// The engine rejected the statement; stderr is the answer.
    QueryError,
    /// Anything else, including termination by signal.
    Abnormal,
}

pub(crate) fn classify(code: Option<i32>) -> ExitClass {
    match code {
        Some(0) => ExitClass::Success,
        Some(1) | Some(2) => ExitClass::QueryError,
        _ => ExitClass::Abnormal,
    }
}

/// Spawn the engine, feed it `command` plus the terminator, and wait for it
/// to exit with both output streams fully drained.
///
/// The child is killed if this future is dropped before it exits.
pub(crate) async fn run(config: &ExecutorConfig, command: &str) -> Result<EngineRun, ExecutorError> {
    let mut child = Command::new(&config.program)
        .args(&config.args)
        .arg(&config.store_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecutorError::Spawn {
            program: config.program.clone(),
            source,
        })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::other("engine stdin was not captured"))?;
    let input = format!("{command}{}", config.terminator);

    let feed = async move {
        let written = stdin.write_all(input.as_bytes()).await;
        drop(stdin);
        written
    };

    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    let output = output?;

    // An engine that exits without reading its input reports through its
    // exit status, not through the pipe.
    if let Err(e) = fed {
        if e.kind() != io::ErrorKind::BrokenPipe {
            return Err(e.into());
        }
    }

    Ok(EngineRun {
        status: output.status,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}
