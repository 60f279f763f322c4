//! Cross-thread bridge into the scheduler (Lane C).
//!
//! The recognizer's callback thread cannot touch session state directly; it
//! posts through this bridge. Barge-in goes: suppression check → cancel the
//! turn lane → run the transport's barge-in handler, all on the scheduler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use super::queue::{EnqueueOutcome, WorkQueue};
use super::turns::TurnLane;
use crate::engine::event::SpeechEvent;

pub struct ThreadBridge {
    handle: tokio::runtime::Handle,
    connection_id: String,
    /// Set around greeting/handoff playback so audio echo cannot trigger a
    /// false barge-in.
    suppress: AtomicBool,
    lane: Mutex<Option<Weak<TurnLane>>>,
}

impl ThreadBridge {
    pub fn new(handle: tokio::runtime::Handle, connection_id: impl Into<String>) -> Self {
        Self {
            handle,
            connection_id: connection_id.into(),
            suppress: AtomicBool::new(false),
            lane: Mutex::new(None),
        }
    }

    /// Weakly link the turn lane for coordinated cancellation.
    pub fn set_turn_lane(&self, lane: &Arc<TurnLane>) {
        *self.lane.lock() = Some(Arc::downgrade(lane));
    }

    pub fn suppress_barge_in(&self) {
        self.suppress.store(true, Ordering::Release);
        tracing::debug!(conn = %self.connection_id, "barge-in suppressed");
    }

    pub fn allow_barge_in(&self) {
        self.suppress.store(false, Ordering::Release);
        tracing::debug!(conn = %self.connection_id, "barge-in allowed");
    }

    pub fn barge_in_suppressed(&self) -> bool {
        self.suppress.load(Ordering::Acquire)
    }

    /// Schedule the barge-in sequence on the scheduler: cancel the current
    /// turn, then run the transport handler. Callable from any thread; a
    /// no-op while suppressed.
    pub fn schedule_barge_in<F>(&self, handler: F)
    where
        F: FnOnce() -> BoxFuture<'static, ()> + Send + 'static,
    {
        if self.barge_in_suppressed() {
            tracing::debug!(conn = %self.connection_id, "barge-in skipped (suppressed)");
            return;
        }

        let lane = self.lane.lock().as_ref().and_then(Weak::upgrade);
        self.handle.spawn(async move {
            if let Some(lane) = lane {
                lane.cancel_current().await;
            }
            handler().await;
        });
    }

    /// Enqueue a speech event for Lane B, logging the outcome. Called from
    /// the recognizer callback thread.
    pub fn queue_speech_result(&self, queue: &WorkQueue, event: SpeechEvent) {
        let label = event.label();
        match queue.enqueue(event) {
            EnqueueOutcome::Enqueued | EnqueueOutcome::EnqueuedAfterEviction => {
                if label != "partial" {
                    tracing::debug!(conn = %self.connection_id, event = label, "speech event enqueued");
                }
            }
            EnqueueOutcome::DroppedPartial => {}
            EnqueueOutcome::DroppedFull => {
                tracing::error!(conn = %self.connection_id, event = label, "speech event dropped");
            }
        }
    }
}
