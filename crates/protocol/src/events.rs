//! Uniform session event envelope.
//!
//! Everything a session listener can observe — transcripts, cancellations,
//! agent changes, tool lifecycle, per-turn latency summaries — travels in
//! one envelope shape so dashboards and recorders need a single decoder.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Event,
    Status,
    TurnMetrics,
}

/// Topics listeners subscribe to. Serialized as the envelope `topic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    UserTranscript,
    UserTranscriptPartial,
    AssistantTranscript,
    AssistantTranscriptDelta,
    AssistantCancelled,
    SessionUpdated,
    AgentChange,
    AgentInventory,
    ToolStart,
    ToolEnd,
    TurnLatency,
}

impl SessionEventKind {
    pub fn as_topic(&self) -> &'static str {
        match self {
            Self::UserTranscript => "user_transcript",
            Self::UserTranscriptPartial => "user_transcript_partial",
            Self::AssistantTranscript => "assistant_transcript",
            Self::AssistantTranscriptDelta => "assistant_transcript_delta",
            Self::AssistantCancelled => "assistant_cancelled",
            Self::SessionUpdated => "session_updated",
            Self::AgentChange => "agent_change",
            Self::AgentInventory => "agent_inventory",
            Self::ToolStart => "tool_start",
            Self::ToolEnd => "tool_end",
            Self::TurnLatency => "turn_latency",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEnvelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    pub sender: String,
    pub payload: serde_json::Value,
    pub topic: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl SessionEnvelope {
    pub fn event(
        session_id: impl Into<String>,
        sender: impl Into<String>,
        topic: SessionEventKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            kind: EnvelopeKind::Event,
            sender: sender.into(),
            payload,
            topic: topic.as_topic().to_owned(),
            session_id: session_id.into(),
            call_id: None,
        }
    }

    pub fn status(
        session_id: impl Into<String>,
        sender: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            kind: EnvelopeKind::Status,
            sender: sender.into(),
            payload,
            topic: "status".into(),
            session_id: session_id.into(),
            call_id: None,
        }
    }

    pub fn turn_metrics(session_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: EnvelopeKind::TurnMetrics,
            sender: "engine".into(),
            payload,
            topic: SessionEventKind::TurnLatency.as_topic().to_owned(),
            session_id: session_id.into(),
            call_id: None,
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shape() {
        let env = SessionEnvelope::event(
            "s1",
            "orchestrator",
            SessionEventKind::AgentChange,
            serde_json::json!({"from": "Concierge", "to": "Advisor"}),
        )
        .with_call_id("call-9");

        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["topic"], "agent_change");
        assert_eq!(json["session_id"], "s1");
        assert_eq!(json["call_id"], "call-9");
    }

    #[test]
    fn turn_metrics_kind() {
        let env = SessionEnvelope::turn_metrics("s1", serde_json::json!({"ttfa_ms": 230}));
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "turn_metrics");
        assert_eq!(json["topic"], "turn_latency");
    }
}
