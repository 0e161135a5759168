//! Executor failures.
//!
//! None of these describe a bad query: engine-level query errors are output
//! content. Every variant here means the execution environment is broken and
//! the node cannot safely keep applying commands.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    /// The engine process could not be started.
    #[error("failed to start SQL engine `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The engine exited with a status other than 0, 1 or 2, or was killed.
    #[error("{}", abnormal_message(.command, .status, .stderr))]
    Abnormal {
        command: String,
        status: String,
        stderr: Vec<u8>,
    },

    /// Talking to the engine or the store file failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn abnormal_message(command: &str, status: &str, stderr: &[u8]) -> String {
    if stderr.is_empty() {
        return format!("SQL engine exited abnormally ({status}) executing {command:?}");
    }
    format!(
        "Error executing {command:?} ({status})\n\nSQLite error: {}",
        fmt_output(stderr)
    )
}

/// Render captured engine output for humans: trailing whitespace trimmed and
/// continuation lines indented.
pub(crate) fn fmt_output(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    text.trim_end().lines().collect::<Vec<_>>().join("\n  ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abnormal_with_stderr_embeds_command_and_output() {
        let err = ExecutorError::Abnormal {
            command: "INSERT INTO t VALUES (1)".into(),
            status: "exit status: 137".into(),
            stderr: b"out of memory\nabort\n".to_vec(),
        };
        assert_eq!(
            err.to_string(),
            "Error executing \"INSERT INTO t VALUES (1)\" (exit status: 137)\n\nSQLite error: out of memory\n  abort"
        );
    }

    #[test]
    fn abnormal_without_stderr_is_one_line() {
        let err = ExecutorError::Abnormal {
            command: "SELECT 1".into(),
            status: "signal: 9 (SIGKILL)".into(),
            stderr: Vec::new(),
        };
        assert_eq!(
            err.to_string(),
            "SQL engine exited abnormally (signal: 9 (SIGKILL)) executing \"SELECT 1\""
        );
    }

    #[test]
    fn fmt_output_handles_single_line() {
        assert_eq!(fmt_output(b"near \"x\": syntax error\n"), "near \"x\": syntax error");
        assert_eq!(fmt_output(b""), "");
    }
}
