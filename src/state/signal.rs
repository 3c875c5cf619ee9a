use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Level-triggered "state changed" flag shared by all writers and consumed
/// by the single broadcast loop.
///
/// Any number of tasks may call [`ChangeSignal::set`] concurrently; the flag
/// stays set until the consumer clears it in [`ChangeSignal::wait_then_clear`].
/// N sets arriving before the consumer wakes collapse into one wake-up, and a
/// set racing with the clear is never lost: the stored notify permit makes
/// the next wait re-check the flag immediately.
pub struct ChangeSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl ChangeSignal {
    pub fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Mark the state as changed. Idempotent, lock-free, safe from any task.
    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Block until the flag is set, then clear it and return. Only the
    /// broadcast loop may call this.
    pub async fn wait_then_clear(&self) {
        loop {
            if self.flag.swap(false, Ordering::SeqCst) {
                return;
            }
            self.notify.notified().await;
        }
    }

    /// Non-blocking peek at the current level.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn wait_returns_immediately_when_already_set() {
        let signal = ChangeSignal::new();
        signal.set();
        timeout(Duration::from_secs(1), signal.wait_then_clear())
            .await
            .expect("wait should complete without a fresh set");
        assert!(!signal.is_set());
    }

    #[tokio::test]
    async fn burst_of_sets_collapses_into_one_wake() {
        let signal = ChangeSignal::new();
        for _ in 0..5 {
            signal.set();
        }
        timeout(Duration::from_secs(1), signal.wait_then_clear())
            .await
            .expect("first wait should complete");

        // All five sets were consumed by the single wake; a second wait
        // pends until somebody signals again.
        let second = timeout(Duration::from_millis(100), signal.wait_then_clear()).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn set_after_wait_started_wakes_the_waiter() {
        let signal = Arc::new(ChangeSignal::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait_then_clear().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        signal.set();
        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn set_during_processing_is_not_lost() {
        let signal = ChangeSignal::new();
        signal.set();
        signal.wait_then_clear().await;

        // A write lands while the consumer is still broadcasting the
        // previous snapshot; the next wait must observe it.
        signal.set();
        timeout(Duration::from_secs(1), signal.wait_then_clear())
            .await
            .expect("second set must produce a second wake");
    }
}
