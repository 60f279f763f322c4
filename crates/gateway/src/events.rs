//! Session event fan-out.
//!
//! Every observable thing a session does — transcripts, cancellations,
//! agent changes, tool lifecycle, turn metrics — is broadcast as a uniform
//! [`SessionEnvelope`] to whoever subscribed (UI sockets, recorders).

use serde_json::Value;
use tokio::sync::broadcast;

use vg_protocol::events::{SessionEnvelope, SessionEventKind};

const CHANNEL_CAPACITY: usize = 256;

pub struct SessionEvents {
    session_id: String,
    call_id: Option<String>,
    tx: broadcast::Sender<SessionEnvelope>,
}

impl SessionEvents {
    pub fn new(session_id: impl Into<String>, call_id: Option<String>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            session_id: session_id.into(),
            call_id,
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEnvelope> {
        self.tx.subscribe()
    }

    pub fn emit(&self, kind: SessionEventKind, sender: &str, payload: Value) {
        let mut env = SessionEnvelope::event(&self.session_id, sender, kind, payload);
        env.call_id = self.call_id.clone();
        // No subscribers is fine; events are observability, not control flow.
        let _ = self.tx.send(env);
    }

    pub fn emit_status(&self, sender: &str, payload: Value) {
        let mut env = SessionEnvelope::status(&self.session_id, sender, payload);
        env.call_id = self.call_id.clone();
        let _ = self.tx.send(env);
    }

    pub fn emit_turn_metrics(&self, payload: Value) {
        let mut env = SessionEnvelope::turn_metrics(&self.session_id, payload);
        env.call_id = self.call_id.clone();
        let _ = self.tx.send(env);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn subscribers_receive_envelopes() {
        let events = SessionEvents::new("s1", Some("call-1".into()));
        let mut rx = events.subscribe();
        events.emit(
            SessionEventKind::UserTranscript,
            "engine",
            json!({"text": "hello"}),
        );

        let env = rx.recv().await.unwrap();
        assert_eq!(env.topic, "user_transcript");
        assert_eq!(env.call_id.as_deref(), Some("call-1"));
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let events = SessionEvents::new("s1", None);
        events.emit_turn_metrics(json!({"total_ms": 10}));
    }
}
