//! Process-wide orchestrator registry and the session-update throttle.
//!
//! The registry exists only so externally-initiated scenario updates can
//! find a session's orchestrator. Entries are weak; stale ones are pruned
//! lazily during each register call, and teardown unregisters explicitly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::Orchestrator;

#[derive(Default)]
pub struct OrchestratorRegistry {
    inner: Mutex<HashMap<String, Weak<Orchestrator>>>,
}

impl OrchestratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session_id: &str, orchestrator: &Arc<Orchestrator>) {
        let mut inner = self.inner.lock();
        inner.retain(|_, weak| weak.strong_count() > 0);
        inner.insert(session_id.to_owned(), Arc::downgrade(orchestrator));
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Orchestrator>> {
        self.inner.lock().get(session_id).and_then(Weak::upgrade)
    }

    pub fn unregister(&self, session_id: &str) {
        self.inner.lock().remove(session_id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session-update throttle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Provider `session.update` pushes are expensive. Callers ask via
/// [`request`]; inside the minimum interval the update is deferred with a
/// pending flag, and the next turn boundary (`take_pending`) flushes it
/// regardless of the interval.
///
/// [`request`]: SessionUpdateThrottle::request
/// [`take_pending`]: SessionUpdateThrottle::take_pending
pub struct SessionUpdateThrottle {
    min_interval: Duration,
    last_sent: Mutex<Option<Instant>>,
    pending: AtomicBool,
}

impl SessionUpdateThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: Mutex::new(None),
            pending: AtomicBool::new(false),
        }
    }

    /// Ask to send an update now. `true` = send immediately, `false` =
    /// deferred (pending flag set).
    pub fn request(&self) -> bool {
        let mut last = self.last_sent.lock();
        let now = Instant::now();
        match *last {
            Some(sent) if now.duration_since(sent) < self.min_interval => {
                self.pending.store(true, Ordering::Release);
                false
            }
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Force an update as pending (e.g. a scenario swap that must reach
    /// the connection on the very next response).
    pub fn mark_pending(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Turn boundary: consume the pending flag, bypassing the throttle.
    pub fn take_pending(&self) -> bool {
        if self.pending.swap(false, Ordering::AcqRel) {
            *self.last_sent.lock() = Some(Instant::now());
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_defers_within_interval() {
        let t = SessionUpdateThrottle::new(Duration::from_secs(2));
        assert!(t.request());
        assert!(!t.request()); // within interval → deferred
        assert!(t.take_pending()); // turn boundary flushes it
        assert!(!t.take_pending()); // consumed
    }

    #[test]
    fn mark_pending_forces_boundary_send() {
        let t = SessionUpdateThrottle::new(Duration::from_secs(2));
        assert!(!t.take_pending());
        t.mark_pending();
        assert!(t.take_pending());
    }

    #[test]
    fn zero_interval_never_defers() {
        let t = SessionUpdateThrottle::new(Duration::ZERO);
        assert!(t.request());
        assert!(t.request());
    }
}
