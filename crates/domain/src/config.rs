use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub stt: SttConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Path to the scenario file (agents + handoff map + start agent).
    #[serde(default)]
    pub scenario_path: Option<PathBuf>,
}

impl Config {
    /// Parse a TOML config document.
    pub fn from_toml_str(raw: &str) -> crate::error::Result<Self> {
        toml::from_str(raw).map_err(|e| crate::error::Error::Config(e.to_string()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Memory store connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "d_memory_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "d_memory_transport")]
    pub transport: MemoryTransport,
    #[serde(default = "d_8000")]
    pub timeout_ms: u64,
    #[serde(default = "d_3")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTransport {
    /// REST calls against the durable store (production).
    Rest,
    /// Process-local store (dev and tests).
    Local,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            base_url: d_memory_url(),
            api_key: None,
            transport: d_memory_transport(),
            timeout_ms: 8000,
            max_retries: 3,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Deployment used when an agent does not name one.
    #[serde(default)]
    pub default_deployment: String,
    /// Hard cap on one turn's LLM streaming, seconds.
    #[serde(default = "d_90")]
    pub turn_timeout_secs: u64,
    /// Per-chunk queue wait, seconds.
    #[serde(default = "d_5")]
    pub chunk_timeout_secs: u64,
    /// Maximum tool-loop iterations within one turn.
    #[serde(default = "d_5_usize")]
    pub max_tool_iterations: usize,
    /// Spoken when the LLM call fails outright.
    #[serde(default = "d_apology")]
    pub apology: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_deployment: String::new(),
            turn_timeout_secs: 90,
            chunk_timeout_secs: 5,
            max_tool_iterations: 5,
            apology: d_apology(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// STT
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    /// Candidate languages, ISO codes, first is preferred.
    #[serde(default = "d_languages")]
    pub languages: Vec<String>,
    /// VAD end-of-utterance silence, milliseconds.
    #[serde(default = "d_800")]
    pub vad_silence_ms: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            languages: d_languages(),
            vad_silence_ms: 800,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TTS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    /// Voice used when neither the caller nor the active agent names one.
    #[serde(default = "d_voice")]
    pub fallback_voice: String,
    /// Pace telephony frames in real time (40 ms sleeps) instead of
    /// flooding the socket.
    #[serde(default)]
    pub telephony_pacing: bool,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            fallback_voice: d_voice(),
            telephony_pacing: false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Work-queue capacity.
    #[serde(default = "d_50")]
    pub queue_capacity: usize,
    /// How many recent user messages to keep in the bounded deque.
    #[serde(default = "d_5_usize")]
    pub user_history_limit: usize,
    /// DTMF inactivity flush delay, milliseconds.
    #[serde(default = "d_1500")]
    pub dtmf_flush_ms: u64,
    /// Minimum interval between LLM session-update pushes, milliseconds.
    #[serde(default = "d_2000")]
    pub session_update_min_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 50,
            user_history_limit: 5,
            dtmf_flush_ms: 1500,
            session_update_min_interval_ms: 2000,
        }
    }
}

// ── serde default helpers ──────────────────────────────────────────

fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_port() -> u16 {
    8765
}
fn d_memory_url() -> String {
    "http://127.0.0.1:7700".into()
}
fn d_memory_transport() -> MemoryTransport {
    MemoryTransport::Rest
}
fn d_apology() -> String {
    "I apologize, I encountered an error processing your request.".into()
}
fn d_languages() -> Vec<String> {
    vec!["en-US".into()]
}
fn d_voice() -> String {
    "en-US-JennyNeural".into()
}
fn d_8000() -> u64 {
    8000
}
fn d_3() -> u32 {
    3
}
fn d_90() -> u64 {
    90
}
fn d_5() -> u64 {
    5
}
fn d_5_usize() -> usize {
    5
}
fn d_800() -> u64 {
    800
}
fn d_50() -> usize {
    50
}
fn d_1500() -> u64 {
    1500
}
fn d_2000() -> u64 {
    2000
}
