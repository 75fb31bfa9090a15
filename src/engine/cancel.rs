//! Cooperative cancellation flag.
//!
//! Setting the flag never aborts work in flight. The orchestrator checks it
//! between operations, and sleeps wake early on it so a stop request does
//! not sit behind a long cool-down.

use std::sync::Arc;
use tokio::sync::watch;

/// Shared "keep running" flag for one run.
#[derive(Clone, Debug)]
pub struct RunFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl RunFlag {
    /// A flag in the running state.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(true);
        Self { tx: Arc::new(tx) }
    }

    /// Request a stop. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_running(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once a stop has been requested (immediately if it already was).
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|running| !*running).await;
    }
}
