use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted during LLM streaming (provider-agnostic).
///
/// Tool-call arguments arrive as concatenated JSON fragments keyed by index;
/// the consumer assembles them into [`crate::message::ToolCall`]s.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A text token chunk.
    #[serde(rename = "token")]
    Token { text: String },

    /// Incremental tool call data for the call at `index`. `call_id` and
    /// `name` are present on the first delta of a call; `arguments` is a
    /// JSON fragment to append.
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta {
        index: usize,
        call_id: Option<String>,
        name: Option<String>,
        arguments: String,
    },

    /// Stream is finished.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        response_id: Option<String>,
    },

    /// An error occurred during streaming.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Token usage for a completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}
