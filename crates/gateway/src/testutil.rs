//! Shared fakes for unit tests. Compiled only for `cfg(test)`.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use vg_domain::capability::{SpeechSynthesizer, VoiceSpec};
use vg_domain::error::Result;
use vg_memory::{LocalMemoryStore, SessionMemory};

use crate::events::SessionEvents;
use crate::session::context::{SessionContext, TransportKind};
use crate::tts::AudioSink;

/// A context over a local memory store. Must be called from a tokio test.
pub fn make_context(transport: TransportKind) -> SessionContext {
    make_context_with_memory(
        transport,
        Arc::new(SessionMemory::new(
            "sess-test-0001",
            Arc::new(LocalMemoryStore::new()),
        )),
    )
}

pub fn make_context_with_memory(
    transport: TransportKind,
    memory: Arc<SessionMemory>,
) -> SessionContext {
    let events = Arc::new(SessionEvents::new(memory.session_id().to_owned(), None));
    SessionContext::new(
        memory.session_id().to_owned(),
        "conn-test",
        transport,
        memory,
        events,
        tokio::runtime::Handle::current(),
    )
}

/// Sink that records every JSON payload and can trip a side effect per send.
#[derive(Default)]
pub struct CollectingSink {
    values: Mutex<Vec<Value>>,
    on_send: Mutex<Option<Box<dyn Fn() + Send>>>,
}

impl CollectingSink {
    pub fn values(&self) -> Vec<Value> {
        self.values.lock().clone()
    }

    pub fn set_on_send(&self, hook: Box<dyn Fn() + Send>) {
        *self.on_send.lock() = Some(hook);
    }
}

#[async_trait::async_trait]
impl AudioSink for CollectingSink {
    async fn send_json(&self, value: Value) -> Result<()> {
        self.values.lock().push(value);
        if let Some(hook) = self.on_send.lock().as_ref() {
            hook();
        }
        Ok(())
    }
}

/// Synthesizer producing a fixed number of zero bytes regardless of text.
pub struct SilenceSynth {
    pub bytes: usize,
}

impl SpeechSynthesizer for SilenceSynth {
    fn synthesize_to_pcm(&self, _text: &str, _voice: &VoiceSpec, _rate: u32) -> Result<Vec<u8>> {
        Ok(vec![0u8; self.bytes])
    }
}
