//! Test support utilities for the sql cluster workspace.
//!
//! - [`engine::ScriptedEngine`]: a shell-script stand-in for the external SQL
//!   engine that records every invocation
//! - [`wait_until`]: poll an async condition with a deadline
//!
//! # Example Usage
//!
//! ```no_run
//! use testsupport::prelude::*;
//!
//! let engine = ScriptedEngine::new().unwrap();
//! let store = engine.store_path("storage.sql");
//! // configure an executor with engine.program(), engine.args() and store
//! assert!(ScriptedEngine::invocations(&store).is_empty());
//! ```

pub mod engine;

use std::future::Future;
use std::time::{Duration, Instant};

/// Poll `condition` every 20ms until it returns true or `deadline` passes.
///
/// Returns whether the condition was eventually met.
pub async fn wait_until<F, Fut>(deadline: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    loop {
        if condition().await {
            return true;
        }
        if start.elapsed() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Convenient re-exports for common testing patterns.
pub mod prelude {
    pub use crate::engine::ScriptedEngine;
    pub use crate::wait_until;
}
