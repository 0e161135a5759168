//! A scripted stand-in for the external SQL engine.
//!
//! The engine is a `/bin/sh` script living in its own temporary directory.
//! It is invoked exactly like the real engine (`<program> <args..> <store>`,
//! command text on stdin) and understands a handful of statement prefixes:
//!
//! | Prefix | Behaviour |
//! |---|---|
//! | `INSERT`, `UPDATE`, `DELETE` | append the statement to the store file |
//! | `SELECT` | print the store file, one stored statement per line |
//! | `FAIL` | print a syntax error on stderr, exit 1 |
//! | `USAGE` | print a usage error on stderr, exit 2 |
//! | `WARN` | print a warning on stderr, exit 0 |
//! | `SLOW` | sleep one second, exit 0 |
//! | `CRASH` | exit 137 |
//!
//! Every invocation appends its stdin to `<store>.invocations`, so tests can
//! count how often the engine really ran.

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DEFAULT_SCRIPT: &str = r#"#!/bin/sh
store="$1"
input=$(cat)
printf '%s\n' "$input" >> "$store.invocations"
case "$input" in
  CRASH*) exit 137 ;;
  FAIL*) printf 'Error: near line 1: syntax error\n' >&2; exit 1 ;;
  USAGE*) printf 'Error: unknown option\n' >&2; exit 2 ;;
  WARN*) printf 'warning: %s\n' "$input" >&2 ;;
  SLOW*) sleep 1 ;;
  SELECT*) if [ -f "$store" ]; then cat "$store"; fi ;;
  INSERT*|UPDATE*|DELETE*) printf '%s\n' "$input" >> "$store" ;;
esac
exit 0
"#;

/// Fake SQL engine backed by a shell script in a private temp directory.
pub struct ScriptedEngine {
    dir: TempDir,
    script: PathBuf,
}

impl ScriptedEngine {
    /// Create an engine running the default script.
    pub fn new() -> Result<Self> {
        Self::with_script(DEFAULT_SCRIPT)
    }

    /// Create an engine running a custom script body.
    pub fn with_script(body: &str) -> Result<Self> {
        let dir = TempDir::new()?;
        let script = dir.path().join("engine.sh");
        fs::write(&script, body)?;
        Ok(Self { dir, script })
    }

    /// An engine that ignores its input, prints the given streams and exits
    /// with `code`.
    pub fn exiting_with(code: i32, stdout: &str, stderr: &str) -> Result<Self> {
        let body = format!(
            "#!/bin/sh\ncat >> \"$1.invocations\"\necho >> \"$1.invocations\"\nprintf '%s' '{stdout}'\nprintf '%s' '{stderr}' >&2\nexit {code}\n"
        );
        Self::with_script(&body)
    }

    /// Program to spawn.
    pub fn program(&self) -> &str {
        "/bin/sh"
    }

    /// Arguments placed before the store path.
    pub fn args(&self) -> Vec<String> {
        vec![self.script.display().to_string()]
    }

    /// A store path inside the engine's directory.
    pub fn store_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Directory owned by this engine.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Command texts the engine has received for `store`, oldest first.
    pub fn invocations(store: &Path) -> Vec<String> {
        let mut log = store.as_os_str().to_owned();
        log.push(".invocations");
        fs::read_to_string(PathBuf::from(log))
            .map(|contents| contents.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
