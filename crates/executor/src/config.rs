//! Executor configuration.

use std::path::PathBuf;

/// How to invoke the external SQL engine for one node's store.
///
/// The engine is spawned as `<program> <args..> <store_path>` with the
/// command text (plus `terminator`) written to its stdin.
///
/// # Example
/// ```
/// use executor::ExecutorConfig;
///
/// let config = ExecutorConfig::builder()
///     .store_path("/var/sqlcluster/node0/storage.sql")
///     .build();
/// assert_eq!(config.program, "sqlite3");
/// assert_eq!(config.terminator, ";");
/// ```
#[derive(Clone, Debug, bon::Builder)]
pub struct ExecutorConfig {
    /// The single store file this executor owns.
    #[builder(into)]
    pub store_path: PathBuf,
    /// Engine binary.
    #[builder(into, default = String::from("sqlite3"))]
    pub program: String,
    /// Arguments placed before the store path.
    #[builder(default)]
    pub args: Vec<String>,
    /// Appended to every command before it is fed to the engine.
    #[builder(into, default = String::from(";"))]
    pub terminator: String,
}
