use serde::{Deserialize, Serialize};

/// Internal tool call format (provider-agnostic).
/// Streaming adapters assemble provider-specific deltas into this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A message in the conversation (provider-agnostic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    /// Tool calls attached to an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set on `Role::Tool` messages: the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

// ── Convenience constructors ───────────────────────────────────────

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// An assistant message that carries tool calls. `text` may be empty
    /// when the model produced calls without narration.
    pub fn assistant_tool_calls(text: &str, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: if text.is_empty() {
                None
            } else {
                Some(text.to_owned())
            },
            tool_calls: calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    /// Plain text of the message, empty string when absent.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// True for assistant messages with tool calls and for tool results —
    /// the shapes that must survive a history round-trip structurally.
    pub fn is_complex(&self) -> bool {
        !self.tool_calls.is_empty() || self.tool_call_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_messages_are_not_complex() {
        assert!(!Message::user("hi").is_complex());
        assert!(!Message::assistant("hello").is_complex());
    }

    #[test]
    fn tool_shapes_are_complex() {
        let call = ToolCall {
            call_id: "c1".into(),
            tool_name: "lookup".into(),
            arguments: serde_json::json!({}),
        };
        assert!(Message::assistant_tool_calls("", vec![call]).is_complex());
        assert!(Message::tool_result("c1", "{}").is_complex());
    }

    #[test]
    fn assistant_tool_calls_drops_empty_text() {
        let msg = Message::assistant_tool_calls("", vec![]);
        assert!(msg.content.is_none());
        let msg = Message::assistant_tool_calls("let me check", vec![]);
        assert_eq!(msg.text(), "let me check");
    }

    #[test]
    fn message_roundtrips_through_json() {
        let call = ToolCall {
            call_id: "c9".into(),
            tool_name: "handoff_to_agent".into(),
            arguments: serde_json::json!({"target_agent": "Advisor"}),
        };
        let msg = Message::assistant_tool_calls("one moment", vec![call]);
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tool_calls.len(), 1);
        assert_eq!(back.tool_calls[0].tool_name, "handoff_to_agent");
    }
}
