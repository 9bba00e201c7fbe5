use std::future::Future;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A single background slot for the next round.
///
/// The prefetched round runs on its own task and owns its own result. It is
/// either adopted whole or discarded; starting a new prefetch discards the
/// previous one.
pub struct Prefetch<T> {
    handle: Option<JoinHandle<T>>,
}

impl<T> Default for Prefetch<T> {
    fn default() -> Self {
        Self { handle: None }
    }
}

impl<T: Send + 'static> Prefetch<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `round` in the background, replacing whatever was in flight.
    pub fn spawn<F>(&mut self, round: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.discard();
        self.handle = Some(tokio::spawn(round));
    }

    pub fn is_pending(&self) -> bool {
        self.handle.is_some()
    }

    /// Wait for the prefetched round and take it. `None` when nothing was
    /// prefetched or the task panicked.
    pub async fn adopt(&mut self) -> Option<T> {
        let handle = self.handle.take()?;
        match handle.await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Prefetched round did not complete");
                None
            }
        }
    }

    /// Abort and drop the prefetched round.
    pub fn discard(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("Discarded prefetched round");
        }
    }
}

impl<T> Drop for Prefetch<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn adopt_returns_the_finished_round() {
        let mut slot = Prefetch::new();
        slot.spawn(async { "next round" });
        assert!(slot.is_pending());
        assert_eq!(slot.adopt().await, Some("next round"));
        assert!(!slot.is_pending());
        assert_eq!(slot.adopt().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn discard_aborts_the_background_round() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let mut slot = Prefetch::new();
        slot.spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            flag.store(true, Ordering::SeqCst);
        });
        slot.discard();
        assert!(!slot.is_pending());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn new_prefetch_replaces_the_old_one() {
        let mut slot = Prefetch::new();
        slot.spawn(std::future::pending::<u32>());
        slot.spawn(async { 2 });
        assert_eq!(slot.adopt().await, Some(2));
    }
}
