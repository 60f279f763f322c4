//! The bounded work queue between the audio ingress lane and the turn
//! processing lane.
//!
//! Enqueue policy under pressure:
//! - partials are dropped silently;
//! - important events evict a queued partial to make room (the eviction is
//!   atomic — one mutex guards the drain-and-refill);
//! - a TTS response that still finds no room blocks up to five seconds for
//!   space; every other important event is dropped with an error log.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use super::event::SpeechEvent;

const BLOCKING_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    EnqueuedAfterEviction,
    DroppedPartial,
    DroppedFull,
}

pub struct WorkQueue {
    inner: Mutex<VecDeque<SpeechEvent>>,
    capacity: usize,
    /// Producers blocked on a full queue wait here.
    space: Condvar,
    /// The async consumer waits here.
    consumer: Notify,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            space: Condvar::new(),
            consumer: Notify::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Enqueue from any thread. Never suspends the caller except for the
    /// bounded blocking path of a TTS response.
    pub fn enqueue(&self, event: SpeechEvent) -> EnqueueOutcome {
        let mut q = self.inner.lock();

        if q.len() < self.capacity {
            q.push_back(event);
            drop(q);
            self.consumer.notify_one();
            return EnqueueOutcome::Enqueued;
        }

        if event.is_droppable() {
            tracing::debug!("work queue full, dropping partial");
            return EnqueueOutcome::DroppedPartial;
        }

        // Eviction pass: remove one queued partial to make room. The queue
        // stays locked throughout, so concurrent enqueuers cannot observe a
        // half-drained queue.
        if let Some(pos) = q.iter().position(SpeechEvent::is_droppable) {
            q.remove(pos);
            let label = event.label();
            q.push_back(event);
            drop(q);
            self.consumer.notify_one();
            tracing::info!(event = label, "enqueued after evicting a partial");
            return EnqueueOutcome::EnqueuedAfterEviction;
        }

        if event.requires_blocking_enqueue() {
            // Wait (bounded) for the consumer to make room.
            tracing::warn!("work queue full of important events, blocking for TTS enqueue");
            let deadline = std::time::Instant::now() + BLOCKING_ENQUEUE_TIMEOUT;
            loop {
                let remaining = match deadline.checked_duration_since(std::time::Instant::now()) {
                    Some(d) if !d.is_zero() => d,
                    _ => {
                        tracing::error!("timed out waiting to enqueue TTS response");
                        return EnqueueOutcome::DroppedFull;
                    }
                };
                let timed_out = self.space.wait_for(&mut q, remaining).timed_out();
                if q.len() < self.capacity {
                    q.push_back(event);
                    drop(q);
                    self.consumer.notify_one();
                    return EnqueueOutcome::Enqueued;
                }
                if timed_out {
                    tracing::error!("timed out waiting to enqueue TTS response");
                    return EnqueueOutcome::DroppedFull;
                }
            }
        }

        tracing::error!(event = event.label(), "work queue still full after eviction, dropping");
        EnqueueOutcome::DroppedFull
    }

    pub(crate) fn try_pop(&self) -> Option<SpeechEvent> {
        let mut q = self.inner.lock();
        let ev = q.pop_front();
        if ev.is_some() {
            self.space.notify_one();
        }
        ev
    }

    /// Await the next event (Lane B's only queue suspension point).
    pub async fn recv(&self) -> SpeechEvent {
        loop {
            let notified = self.consumer.notified();
            if let Some(ev) = self.try_pop() {
                return ev;
            }
            notified.await;
        }
    }

    /// Drop all pending events (barge-in). Returns how many were removed.
    pub fn drain(&self) -> usize {
        let mut q = self.inner.lock();
        let n = q.len();
        q.clear();
        drop(q);
        self.space.notify_all();
        n
    }
}
