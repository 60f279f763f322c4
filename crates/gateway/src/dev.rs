//! Dev-mode capability implementations.
//!
//! Production deployments inject vendor adapters for STT/TTS/LLM behind the
//! `vg-domain` capability traits. These stand-ins keep the gateway runnable
//! (and the core testable) without any provider credentials: a scripted
//! LLM, a silence synthesizer, and a recognizer driven by explicit pushes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use vg_domain::capability::{
    ChatRequest, LlmClient, RecognizerEvents, SpeechRecognizer, SpeechSynthesizer, VoiceSpec,
};
use vg_domain::error::{Error, Result};
use vg_domain::stream::{BoxStream, StreamEvent, Usage};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scripted LLM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Plays back pre-scripted stream events, one script per `chat_stream`
/// call, recording every request it sees.
#[derive(Default)]
pub struct ScriptedLlm {
    scripts: Mutex<VecDeque<Vec<StreamEvent>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_script(&self, events: Vec<StreamEvent>) {
        self.scripts.lock().push_back(events);
    }

    /// Requests observed so far (for assertions).
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    /// A script that streams `text` in small token chunks then finishes.
    pub fn text_script(text: &str) -> Vec<StreamEvent> {
        let mut events: Vec<StreamEvent> = Vec::new();
        let chars: Vec<char> = text.chars().collect();
        for chunk in chars.chunks(8) {
            events.push(StreamEvent::Token {
                text: chunk.iter().collect(),
            });
        }
        events.push(StreamEvent::Done {
            usage: Some(Usage {
                input_tokens: 40,
                output_tokens: (text.len() / 4) as u32,
            }),
            response_id: None,
        });
        events
    }

    /// A script that emits one tool call (arguments split across deltas)
    /// with optional narration tokens streamed after it — the shape models
    /// emit when they narrate a transfer they have already initiated.
    pub fn tool_call_script(name: &str, args_json: &str, narration: Option<&str>) -> Vec<StreamEvent> {
        let mut events: Vec<StreamEvent> = Vec::new();
        let mid = args_json.len() / 2;
        // Split on a char boundary.
        let mut split = mid;
        while split > 0 && !args_json.is_char_boundary(split) {
            split -= 1;
        }
        events.push(StreamEvent::ToolCallDelta {
            index: 0,
            call_id: Some(format!("call_{name}")),
            name: Some(name.into()),
            arguments: args_json[..split].into(),
        });
        events.push(StreamEvent::ToolCallDelta {
            index: 0,
            call_id: None,
            name: None,
            arguments: args_json[split..].into(),
        });
        if let Some(text) = narration {
            events.push(StreamEvent::Token { text: text.into() });
        }
        events.push(StreamEvent::Done {
            usage: Some(Usage {
                input_tokens: 40,
                output_tokens: 12,
            }),
            response_id: None,
        });
        events
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        self.requests.lock().push(req);
        let events = self.scripts.lock().pop_front().unwrap_or_else(|| {
            vec![StreamEvent::Done {
                usage: None,
                response_id: None,
            }]
        });
        Ok(Box::pin(futures_util::stream::iter(
            events.into_iter().map(Ok),
        )))
    }
}

/// Dev-mode conversational stand-in: repeats the last user message back
/// as a streamed response so the full audio loop is exercisable without a
/// model.
pub struct EchoLlm;

#[async_trait::async_trait]
impl LlmClient for EchoLlm {
    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let last_user = req
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, vg_domain::message::Role::User))
            .map(|m| m.text().to_owned())
            .unwrap_or_default();
        let reply = if last_user.is_empty() {
            "I'm listening.".to_owned()
        } else {
            format!("You said: {last_user}")
        };
        Ok(Box::pin(futures_util::stream::iter(
            ScriptedLlm::text_script(&reply).into_iter().map(Ok),
        )))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Silence synthesizer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Produces silence sized roughly like real speech: ~64 bytes of PCM per
/// character, rounded to whole samples.
pub struct DevSynthesizer;

impl SpeechSynthesizer for DevSynthesizer {
    fn synthesize_to_pcm(&self, text: &str, _voice: &VoiceSpec, _rate: u32) -> Result<Vec<u8>> {
        let len = (text.chars().count() * 64) & !1;
        Ok(vec![0u8; len.max(2)])
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Push-driven recognizer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A recognizer without a speech model: audio bytes are counted and
/// dropped, while `push_partial`/`push_final` inject results exactly like
/// a vendor SDK's callback thread would.
#[derive(Default)]
pub struct DevRecognizer {
    ready: AtomicBool,
    started: AtomicBool,
    bytes_received: AtomicUsize,
    events: Mutex<Option<RecognizerEvents>>,
}

impl DevRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes_received(&self) -> usize {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Simulate a partial recognition callback.
    pub fn push_partial(&self, text: &str, lang: &str) {
        if let Some(events) = self.events.lock().as_ref() {
            (events.on_partial)(text, lang, None);
        }
    }

    /// Simulate a final recognition callback.
    pub fn push_final(&self, text: &str, lang: &str) {
        if let Some(events) = self.events.lock().as_ref() {
            (events.on_final)(text, lang, None);
        }
    }

    pub fn push_error(&self, message: &str) {
        if let Some(events) = self.events.lock().as_ref() {
            (events.on_error)(message);
        }
    }
}

impl SpeechRecognizer for DevRecognizer {
    fn prepare(&self) -> Result<()> {
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn start(&self, events: RecognizerEvents) -> Result<()> {
        if !self.is_ready() {
            return Err(Error::Stt("push stream not initialized".into()));
        }
        self.started.store(true, Ordering::Release);
        *self.events.lock() = Some(events);
        Ok(())
    }

    fn write_audio(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_ready() {
            return Err(Error::Stt("push stream not initialized".into()));
        }
        self.bytes_received.fetch_add(bytes.len(), Ordering::Relaxed);
        Ok(())
    }

    fn stop(&self) {
        self.started.store(false, Ordering::Release);
        *self.events.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn scripted_llm_replays_in_order() {
        let llm = ScriptedLlm::new();
        llm.push_script(ScriptedLlm::text_script("first"));
        llm.push_script(ScriptedLlm::text_script("second"));

        for expected in ["first", "second"] {
            let mut stream = llm.chat_stream(ChatRequest::default()).await.unwrap();
            let mut text = String::new();
            while let Some(Ok(ev)) = stream.next().await {
                if let StreamEvent::Token { text: t } = ev {
                    text.push_str(&t);
                }
            }
            assert_eq!(text, expected);
        }
        assert_eq!(llm.requests().len(), 2);
    }

    #[test]
    fn recognizer_requires_prepare_before_write() {
        let rec = DevRecognizer::new();
        assert!(rec.write_audio(&[0u8; 4]).is_err());
        rec.prepare().unwrap();
        assert!(rec.write_audio(&[0u8; 4]).is_ok());
        assert_eq!(rec.bytes_received(), 4);
    }

    #[test]
    fn synthesizer_output_scales_with_text() {
        let s = DevSynthesizer;
        let short = s
            .synthesize_to_pcm("hi", &VoiceSpec::named("v"), 16_000)
            .unwrap();
        let long = s
            .synthesize_to_pcm("a much longer sentence", &VoiceSpec::named("v"), 16_000)
            .unwrap();
        assert!(long.len() > short.len());
        assert_eq!(long.len() % 2, 0);
    }
}
