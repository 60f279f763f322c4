/// Shared error type used across all VoiceGate crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("speech recognition: {0}")]
    Stt(String),

    #[error("speech synthesis: {0}")]
    Tts(String),

    #[error("LLM {provider}: {message}")]
    Llm { provider: String, message: String },

    #[error("memory store: {0}")]
    Memory(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("handoff: {0}")]
    Handoff(String),

    #[error("tool {tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
