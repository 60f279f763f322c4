//! Capability traits for the external speech and language services.
//!
//! The orchestrator core never talks to a vendor SDK directly; it is handed
//! trait objects for recognition, synthesis, and chat completion. Concrete
//! adapters live outside this workspace — tests use scripted fakes.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{Message, ToolDefinition};
use crate::stream::{BoxStream, StreamEvent};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Voice / model specs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// TTS voice selection: a named voice plus optional style/rate tweaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<String>,
}

impl VoiceSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            style: None,
            rate: None,
        }
    }
}

/// Model parameters for one LLM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    pub deployment_id: String,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_top_p")]
    pub top_p: f32,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
}

fn d_temperature() -> f32 {
    0.7
}
fn d_top_p() -> f32 {
    0.9
}
fn d_max_tokens() -> u32 {
    4096
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            deployment_id: String::new(),
            temperature: d_temperature(),
            top_p: d_top_p(),
            max_tokens: d_max_tokens(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A streaming chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub model: ModelSpec,
}

/// Streaming chat completion capability.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Start a streaming completion. The stream yields text deltas,
    /// tool-call deltas, and a terminal `Done` event with usage.
    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// STT
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Callbacks the recognizer invokes from its own worker thread.
///
/// `lang` is an ISO code; `speaker` is an opaque diarization label the core
/// passes through without interpreting.
pub struct RecognizerEvents {
    pub on_partial: Box<dyn Fn(&str, &str, Option<&str>) + Send + Sync>,
    pub on_final: Box<dyn Fn(&str, &str, Option<&str>) + Send + Sync>,
    pub on_error: Box<dyn Fn(&str) + Send + Sync>,
}

/// Streaming speech recognition capability.
///
/// `prepare` must be called before `start` so the push stream exists before
/// the first audio frame arrives; frames written to an unprepared recognizer
/// are lost by some vendor SDKs.
pub trait SpeechRecognizer: Send + Sync {
    /// Eagerly create the push stream. Idempotent.
    fn prepare(&self) -> Result<()>;

    /// True once `prepare` has succeeded and bytes may be written.
    fn is_ready(&self) -> bool;

    /// Begin continuous recognition, delivering results via `events`.
    fn start(&self, events: RecognizerEvents) -> Result<()>;

    /// Push raw PCM bytes. Callable from any thread.
    fn write_audio(&self, bytes: &[u8]) -> Result<()>;

    /// Stop recognition and release the push stream.
    fn stop(&self);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TTS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Text-to-PCM synthesis capability.
///
/// Synchronous by contract: playback runs it on a blocking worker so the
/// scheduler lane never stalls on synthesis.
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` to PCM int16 mono at `sample_rate`.
    /// An empty result is treated as a synthesis failure by callers.
    fn synthesize_to_pcm(&self, text: &str, voice: &VoiceSpec, sample_rate: u32) -> Result<Vec<u8>>;
}
