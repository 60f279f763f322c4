//! WebSocket endpoints: the telephony media stream and the browser audio
//! channel. Both assemble the same per-session stack — context, memory,
//! pools, TTS playback, turn engine, orchestrator — and differ only in
//! framing and barge-in reaction.

pub mod browser;
pub mod dtmf;
pub mod telephony;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use vg_domain::capability::VoiceSpec;
use vg_domain::error::{Error, Result};
use vg_memory::SessionMemory;

use crate::engine::ingress::BargeInHandler;
use crate::engine::{SpeechEvent, SpeechIngress, ThreadBridge, TurnEngine, TurnLane, WorkQueue};
use crate::events::SessionEvents;
use crate::orchestrator::Orchestrator;
use crate::session::context::{SessionContext, TransportKind};
use crate::state::AppState;
use crate::tts::{AudioSink, TtsPlayback};
use crate::ws::dtmf::DtmfBuffer;

/// Sink writing JSON text frames into the socket's outbound pump. Resets
/// the transport's stop-audio latch whenever playback frames resume.
pub struct WsJsonSink {
    tx: mpsc::Sender<String>,
    stop_audio_pending: Arc<AtomicBool>,
}

impl WsJsonSink {
    pub fn new(tx: mpsc::Sender<String>, stop_audio_pending: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            stop_audio_pending,
        }
    }
}

#[async_trait::async_trait]
impl AudioSink for WsJsonSink {
    async fn send_json(&self, value: Value) -> Result<()> {
        let is_audio_frame = value.get("kind").map(|k| k == "AudioData").unwrap_or(false)
            || value.get("type").map(|t| t == "audio_data").unwrap_or(false);
        if is_audio_frame {
            self.stop_audio_pending.store(false, Ordering::Release);
        }
        let text = serde_json::to_string(&value)?;
        self.tx
            .send(text)
            .await
            .map_err(|_| Error::Transport("outbound channel closed".into()))
    }
}

/// Everything a live connection owns.
pub struct LiveSession {
    pub context: Arc<SessionContext>,
    pub engine: TurnEngine,
    pub orchestrator: Arc<Orchestrator>,
    pub dtmf: Arc<DtmfBuffer>,
}

/// Assemble the per-session stack and start the engine lanes.
pub async fn build_session(
    state: &AppState,
    transport: TransportKind,
    connection_id: &str,
    sink: Arc<dyn AudioSink>,
    barge_in: BargeInHandler,
) -> Result<LiveSession> {
    let session_id = uuid::Uuid::new_v4().to_string();

    let memory = Arc::new(SessionMemory::new(&session_id, Arc::clone(&state.memory)));
    memory.hydrate().await?;

    let events = Arc::new(SessionEvents::new(&session_id, None));
    let context = Arc::new(SessionContext::new(
        &session_id,
        connection_id,
        transport,
        Arc::clone(&memory),
        events,
        tokio::runtime::Handle::current(),
    ));

    // Pool checkouts happen up front so a missing capability fails the
    // connection instead of the first utterance.
    let recognizer = state.stt_pool.acquire(&session_id)?;
    state.tts_pool.acquire(&session_id)?;

    let queue = Arc::new(WorkQueue::new(state.config.engine.queue_capacity));
    let bridge = Arc::new(ThreadBridge::new(
        tokio::runtime::Handle::current(),
        connection_id,
    ));

    let tts = Arc::new(TtsPlayback::new(
        Arc::clone(&context),
        Arc::clone(&state.tts_pool),
        sink,
        VoiceSpec::named(state.config.tts.fallback_voice.clone()),
        state.config.tts.telephony_pacing,
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&context),
        Arc::clone(&state.llm),
        Arc::clone(&state.tools),
        (*state.scenario).clone(),
        state.config.llm.clone(),
        state.config.engine.clone(),
    ));
    state.orchestrators.register(&session_id, &orchestrator);

    let lane = Arc::new(TurnLane::new(
        Arc::clone(&context),
        Arc::clone(&queue),
        Arc::clone(&orchestrator),
        tts,
        Arc::clone(&bridge),
    ));

    let ingress = Arc::new(SpeechIngress::new(
        recognizer,
        Arc::clone(&bridge),
        Arc::clone(&queue),
        Arc::clone(&context),
        barge_in,
    ));

    let dtmf = Arc::new(DtmfBuffer::new(
        Arc::clone(&queue),
        Duration::from_millis(state.config.engine.dtmf_flush_ms),
    ));

    let engine = TurnEngine {
        context: Arc::clone(&context),
        queue,
        bridge,
        ingress,
        lane,
    };
    engine.start()?;

    // Open the conversation with the active agent's greeting.
    if let Some(greeting) = orchestrator.session_greeting() {
        engine.queue.enqueue(SpeechEvent::Greeting {
            text: greeting,
            voice: None,
        });
    }

    tracing::info!(
        session_id = %session_id,
        connection_id,
        transport = transport.as_str(),
        "session started"
    );

    Ok(LiveSession {
        context,
        engine,
        orchestrator,
        dtmf,
    })
}

/// Ordered session teardown: engine shutdown, pool release, registry
/// unregister.
pub async fn teardown_session(state: &AppState, live: LiveSession) {
    let session_id = live.context.session_id.clone();
    live.dtmf.stop();
    live.engine.stop().await;
    state.stt_pool.release(&session_id);
    state.tts_pool.release(&session_id);
    state.orchestrators.unregister(&session_id);
    tracing::info!(session_id = %session_id, "session closed");
}
