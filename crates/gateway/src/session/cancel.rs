//! Per-session cancellation signal.
//!
//! Level-triggered and resettable: barge-in sets it, the TTS frame loop
//! observes-and-clears it between frames, the LLM stream consumer observes
//! it between chunks, and a new turn clears it on entry. Safe to set and
//! clear from any execution context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

pub struct CancelSignal {
    set: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self {
            set: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Signal cancellation and wake any waiters.
    pub fn set(&self) {
        self.set.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn clear(&self) {
        self.set.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// Observe-and-clear in one step. The TTS frame loop uses this so a
    /// late cancellation does not leak into the next utterance.
    pub fn take(&self) -> bool {
        self.set.swap(false, Ordering::AcqRel)
    }

    /// Wait until the signal is set, up to `timeout`. Returns `true` when
    /// the signal fired, `false` on timeout. Does not clear.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let waiter = async {
            loop {
                let notified = self.notify.notified();
                if self.is_set() {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, waiter).await.is_ok()
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn set_clear_take_lifecycle() {
        let sig = CancelSignal::new();
        assert!(!sig.is_set());

        sig.set();
        assert!(sig.is_set());

        sig.clear();
        assert!(!sig.is_set());

        sig.set();
        assert!(sig.take());
        assert!(!sig.is_set());
        assert!(!sig.take());
    }

    #[tokio::test]
    async fn wait_returns_true_when_signalled() {
        let sig = Arc::new(CancelSignal::new());
        let waiter = {
            let sig = Arc::clone(&sig);
            tokio::spawn(async move { sig.wait(Duration::from_secs(2)).await })
        };
        tokio::task::yield_now().await;
        sig.set();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn wait_times_out_when_not_signalled() {
        let sig = CancelSignal::new();
        assert!(!sig.wait(Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_already_set() {
        let sig = CancelSignal::new();
        sig.set();
        assert!(sig.wait(Duration::from_millis(5)).await);
    }

    #[test]
    fn set_from_foreign_thread_is_visible() {
        let sig = Arc::new(CancelSignal::new());
        let handle = {
            let sig = Arc::clone(&sig);
            std::thread::spawn(move || sig.set())
        };
        handle.join().unwrap();
        assert!(sig.is_set());
    }
}
