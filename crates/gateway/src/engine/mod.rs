//! The turn engine: three lanes around a bounded work queue.
//!
//! Lane A ([`ingress::SpeechIngress`]) owns the recognizer and posts events
//! from the vendor callback thread. Lane B ([`turns::TurnLane`]) is the
//! serialized turn processor. Lane C is the scheduler itself, reached
//! through [`bridge::ThreadBridge`] for barge-in fan-out.

pub mod bridge;
pub mod event;
pub mod ingress;
pub mod queue;
pub mod turns;

pub use bridge::ThreadBridge;
pub use event::SpeechEvent;
pub use ingress::SpeechIngress;
pub use queue::{EnqueueOutcome, WorkQueue};
pub use turns::TurnLane;

use std::sync::Arc;
use std::time::Duration;

use crate::session::context::SessionContext;

/// The assembled engine for one session.
pub struct TurnEngine {
    pub context: Arc<SessionContext>,
    pub queue: Arc<WorkQueue>,
    pub bridge: Arc<ThreadBridge>,
    pub ingress: Arc<SpeechIngress>,
    pub lane: Arc<TurnLane>,
}

impl TurnEngine {
    /// Start Lane A (recognizer) and Lane B (queue loop).
    pub fn start(&self) -> vg_domain::error::Result<()> {
        self.bridge.set_turn_lane(&self.lane);
        self.ingress.start()?;
        self.lane.start();
        Ok(())
    }

    /// Ordered shutdown: stop intake, persist, stop lanes, cancel stragglers.
    pub async fn stop(&self) {
        // 1. Refuse new events.
        self.context.begin_shutdown();

        // 2. Persist session state, best-effort.
        match tokio::time::timeout(Duration::from_secs(2), self.context.memory.flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(session = %self.context.session_short(), error = %e, "state flush failed on shutdown");
            }
            Err(_) => {
                tracing::warn!(session = %self.context.session_short(), "state flush timed out on shutdown");
            }
        }

        // 3. Stop Lane B; closes any open turn span.
        self.lane.stop().await;

        // 4. Stop Lane A.
        self.ingress.stop();

        // 5. Cancel registered background tasks.
        self.context.abort_tasks();

        tracing::info!(session = %self.context.session_short(), "turn engine stopped");
    }
}
