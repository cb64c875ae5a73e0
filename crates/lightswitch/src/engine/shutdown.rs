use std::sync::Arc;

use tokio::sync::watch;

/// Process-wide stop signal shared by every pipeline task.
///
/// Cloning is cheap; all clones observe the same signal. Triggering is
/// idempotent.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal. Returns `true` only for the call that actually fired it.
    pub fn trigger(&self) -> bool {
        !self.tx.send_replace(true)
    }

    /// Resolves once the signal has fired, immediately if it already has.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on trigger
        let _ = rx.wait_for(|triggered| *triggered).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
