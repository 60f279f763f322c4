//! The typed per-session context bundle.
//!
//! Everything a turn needs without global lookups: identifiers, transport
//! kind, the cancel signal, playback flags, the active agent slot, the
//! session memory handle, the latency accumulator, the task registry, and
//! a scheduler handle for posting work from non-scheduler threads. The
//! context owns no business logic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use vg_agents::AgentDescriptor;
use vg_memory::SessionMemory;

use crate::events::SessionEvents;
use crate::session::cancel::CancelSignal;
use crate::session::latency::LatencyTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Telephony,
    Browser,
    Realtime,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Telephony => "telephony",
            TransportKind::Browser => "browser",
            TransportKind::Realtime => "realtime",
        }
    }

    /// Native playback sample rate of the transport.
    pub fn sample_rate(&self) -> u32 {
        match self {
            TransportKind::Telephony => crate::audio::SAMPLE_RATE_TELEPHONY,
            TransportKind::Browser | TransportKind::Realtime => crate::audio::SAMPLE_RATE_BROWSER,
        }
    }
}

pub struct SessionContext {
    pub session_id: String,
    pub transport_connection_id: String,
    pub transport: TransportKind,

    pub cancel: CancelSignal,
    pub latency: LatencyTracker,
    pub memory: Arc<SessionMemory>,
    pub events: Arc<SessionEvents>,

    is_synthesizing: AtomicBool,
    is_audio_playing: AtomicBool,
    cancel_requested: AtomicBool,
    shutdown: AtomicBool,

    active_agent: RwLock<Option<Arc<AgentDescriptor>>>,
    /// In-flight background work, cancelled on teardown.
    tasks: Mutex<Vec<JoinHandle<()>>>,
    scheduler: tokio::runtime::Handle,
}

impl SessionContext {
    pub fn new(
        session_id: impl Into<String>,
        transport_connection_id: impl Into<String>,
        transport: TransportKind,
        memory: Arc<SessionMemory>,
        events: Arc<SessionEvents>,
        scheduler: tokio::runtime::Handle,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            transport_connection_id: transport_connection_id.into(),
            transport,
            cancel: CancelSignal::new(),
            latency: LatencyTracker::new(),
            memory,
            events,
            is_synthesizing: AtomicBool::new(false),
            is_audio_playing: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            active_agent: RwLock::new(None),
            tasks: Mutex::new(Vec::new()),
            scheduler,
        }
    }

    /// Short session id for log lines.
    pub fn session_short(&self) -> &str {
        let id = self.session_id.as_str();
        &id[id.len().saturating_sub(8)..]
    }

    // ── cancellation ─────────────────────────────────────────────────

    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
        self.cancel.set();
    }

    pub fn clear_cancel(&self) {
        self.cancel_requested.store(false, Ordering::Release);
        self.cancel.clear();
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    pub async fn wait_cancel(&self, timeout: Duration) -> bool {
        self.cancel.wait(timeout).await
    }

    // ── playback flags (single writer: the playback path) ────────────

    pub fn set_synthesizing(&self, on: bool) {
        self.is_synthesizing.store(on, Ordering::Release);
    }

    pub fn is_synthesizing(&self) -> bool {
        self.is_synthesizing.load(Ordering::Acquire)
    }

    pub fn set_audio_playing(&self, on: bool) {
        self.is_audio_playing.store(on, Ordering::Release);
    }

    pub fn is_audio_playing(&self) -> bool {
        self.is_audio_playing.load(Ordering::Acquire)
    }

    // ── active agent ─────────────────────────────────────────────────

    /// Single writer (the orchestrator); readers may briefly observe the
    /// previous agent around a turn boundary.
    pub fn set_active_agent(&self, agent: Arc<AgentDescriptor>) {
        *self.active_agent.write() = Some(agent);
    }

    pub fn active_agent(&self) -> Option<Arc<AgentDescriptor>> {
        self.active_agent.read().clone()
    }

    // ── background tasks ─────────────────────────────────────────────

    pub fn register_task(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock();
        // Prune finished handles while we hold the lock.
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    pub fn abort_tasks(&self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }

    // ── scheduling ───────────────────────────────────────────────────

    pub fn begin_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub fn scheduler(&self) -> &tokio::runtime::Handle {
        &self.scheduler
    }

    /// Post a future onto the session's scheduler from any thread.
    ///
    /// Returns `None` once teardown has begun — callers must tolerate a
    /// dropped post.
    pub fn schedule_from_foreign_context<F>(&self, fut: F) -> Option<JoinHandle<F::Output>>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.is_shutting_down() {
            return None;
        }
        Some(self.scheduler.spawn(fut))
    }
}
