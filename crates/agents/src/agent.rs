use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use vg_domain::capability::{ModelSpec, VoiceSpec};

/// One agent, immutable once loaded at startup or scenario swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,

    /// Spoken on first visit. A template over the session's system vars.
    #[serde(default)]
    pub greeting_template: Option<String>,
    /// Spoken when the user returns to an already-visited agent.
    #[serde(default)]
    pub return_greeting_template: Option<String>,
    /// System prompt template.
    pub prompt_template: String,

    #[serde(default)]
    pub voice: Option<VoiceSpec>,

    /// Default model parameters.
    #[serde(default)]
    pub model: ModelSpec,
    /// Override used by the STT→LLM→TTS cascade path.
    #[serde(default)]
    pub model_cascade: Option<ModelSpec>,
    /// Override used by speech-to-speech realtime connections.
    #[serde(default)]
    pub model_realtime: Option<ModelSpec>,

    /// Tools this agent may call, resolved via the tool registry.
    #[serde(default)]
    pub tool_names: Vec<String>,
    /// Legacy named handoff edges: tool name → target agent.
    #[serde(default)]
    pub outgoing_handoffs: HashMap<String, String>,
}

/// Which model variant a connection mode should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelMode {
    Cascade,
    Realtime,
}

impl AgentDescriptor {
    /// Pick the model for a mode, falling back to the generic model.
    pub fn model_for_mode(&self, mode: ModelMode) -> &ModelSpec {
        match mode {
            ModelMode::Cascade => self.model_cascade.as_ref().unwrap_or(&self.model),
            ModelMode::Realtime => self.model_realtime.as_ref().unwrap_or(&self.model),
        }
    }

    /// Render the system prompt with the session's variable bag.
    pub fn render_prompt(&self, vars: &serde_json::Map<String, Value>) -> String {
        render_template(&self.prompt_template, vars)
    }

    /// Render the first-visit greeting, if the agent has one.
    pub fn render_greeting(&self, vars: &serde_json::Map<String, Value>) -> Option<String> {
        self.greeting_template
            .as_deref()
            .map(|t| render_template(t, vars))
    }

    /// Render the return-visit greeting, if the agent has one.
    pub fn render_return_greeting(&self, vars: &serde_json::Map<String, Value>) -> Option<String> {
        self.return_greeting_template
            .as_deref()
            .map(|t| render_template(t, vars))
    }

    pub fn has_outgoing_handoffs(&self) -> bool {
        !self.outgoing_handoffs.is_empty()
    }
}

/// Substitute `{{ var }}` placeholders from the variable bag.
///
/// Strings render raw; other JSON values render compact. Unknown variables
/// render empty so a missing profile never leaks placeholder syntax into a
/// prompt.
pub fn render_template(template: &str, vars: &serde_json::Map<String, Value>) -> String {
    let re = placeholder_re();
    re.replace_all(template, |caps: &regex::Captures<'_>| {
        match vars.get(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    })
    .into_owned()
}

fn placeholder_re() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").unwrap())
}
