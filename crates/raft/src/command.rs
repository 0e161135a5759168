//! Raft log entry command types.
//!
//! A [`Command`] is the only kind of application entry in the log: the text of
//! one SQL statement, wrapped without interpretation. Applying it hands the
//! text to the executor, which decides between a fresh run and a cached
//! answer.

use executor::Output;
use serde::{Deserialize, Serialize};

/// A statement replicated through Raft consensus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Execute `query` against the local store.
    #[serde(rename = "sql")]
    Sql { query: String },
}

impl Command {
    pub fn sql(query: impl Into<String>) -> Self {
        Self::Sql {
            query: query.into(),
        }
    }

    pub fn query(&self) -> &str {
        match self {
            Self::Sql { query } => query,
        }
    }
}

/// Response from applying one log entry to the state machine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandResponse {
    /// Output of a [`Command::Sql`] entry.
    Output(Output),
    /// Blank and membership entries carry no application payload.
    Empty,
}

impl CommandResponse {
    /// The SQL output, if this response carries one.
    pub fn output(&self) -> Option<&Output> {
        match self {
            Self::Output(output) => Some(output),
            Self::Empty => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_is_tagged_sql() {
        let json = serde_json::to_string(&Command::sql("SELECT 1")).unwrap();
        assert_eq!(json, r#"{"sql":{"query":"SELECT 1"}}"#);
    }

    #[test]
    fn command_survives_log_encoding() {
        let cmd = Command::sql("INSERT INTO t VALUES ('a;b')");
        let config = bincode::config::legacy();
        let bytes = bincode::serde::encode_to_vec(&cmd, config).unwrap();
        let (decoded, _): (Command, _) = bincode::serde::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(decoded, cmd);
        assert_eq!(decoded.query(), "INSERT INTO t VALUES ('a;b')");
    }

    #[test]
    fn response_exposes_output() {
        let output = Output {
            stdout: b"1\n".to_vec(),
            stderr: Vec::new(),
            sequence_number: 3,
        };
        assert_eq!(
            CommandResponse::Output(output.clone()).output(),
            Some(&output)
        );
        assert_eq!(CommandResponse::Empty.output(), None);
    }
}
