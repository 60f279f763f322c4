//! Per-session memory manager.
//!
//! `SessionMemory` fronts the durable store for one conversation. Every
//! read and write on the hot path hits an in-process cache; durability is a
//! background concern (`flush_background`), so a turn never blocks on the
//! store. History appends are immediate in memory and flushed lazily.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use vg_domain::error::Result;

use crate::provider::{MemoryProvider, Namespace};

/// One line of an agent's conversation history.
///
/// Complex turns (assistant tool calls, tool results) store a JSON envelope
/// in `content`; the orchestrator expands them back before an LLM call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

/// Core-namespace key the per-agent history map is flushed under.
const HISTORY_KEY: &str = "conversation_history";

pub struct SessionMemory {
    session_id: String,
    provider: Arc<dyn MemoryProvider>,
    core: RwLock<HashMap<String, Value>>,
    context: RwLock<HashMap<String, Value>>,
    /// agent name → transcript lines.
    history: RwLock<HashMap<String, Vec<HistoryEntry>>>,
    dirty_core: Mutex<HashSet<String>>,
    dirty_context: Mutex<HashSet<String>>,
    history_dirty: Mutex<bool>,
}

impl SessionMemory {
    pub fn new(session_id: impl Into<String>, provider: Arc<dyn MemoryProvider>) -> Self {
        Self {
            session_id: session_id.into(),
            provider,
            core: RwLock::new(HashMap::new()),
            context: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            dirty_core: Mutex::new(HashSet::new()),
            dirty_context: Mutex::new(HashSet::new()),
            history_dirty: Mutex::new(false),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Load both namespaces from the store into the cache. Called once at
    /// session open; read failures fall back to empty defaults.
    pub async fn hydrate(&self) -> Result<()> {
        let core = self
            .provider
            .load_namespace(Namespace::Core, &self.session_id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(session_id = %self.session_id, error = %e, "core hydrate failed, starting empty");
                HashMap::new()
            });
        let context = self
            .provider
            .load_namespace(Namespace::Context, &self.session_id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(session_id = %self.session_id, error = %e, "context hydrate failed, starting empty");
                HashMap::new()
            });

        if let Some(raw) = core.get(HISTORY_KEY) {
            if let Ok(map) =
                serde_json::from_value::<HashMap<String, Vec<HistoryEntry>>>(raw.clone())
            {
                *self.history.write() = map;
            }
        }
        *self.core.write() = core;
        *self.context.write() = context;
        Ok(())
    }

    // ── key/value access ─────────────────────────────────────────────

    /// Read a key, core namespace first, then context.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(v) = self.core.read().get(key) {
            return Some(v.clone());
        }
        self.context.read().get(key).cloned()
    }

    pub fn get_core(&self, key: &str) -> Option<Value> {
        self.core.read().get(key).cloned()
    }

    pub fn set_core(&self, key: &str, value: Value) {
        self.core.write().insert(key.to_owned(), value);
        self.dirty_core.lock().insert(key.to_owned());
    }

    pub fn delete_core(&self, key: &str) {
        self.core.write().insert(key.to_owned(), Value::Null);
        self.dirty_core.lock().insert(key.to_owned());
    }

    pub fn get_context(&self, key: &str) -> Option<Value> {
        self.context.read().get(key).cloned()
    }

    pub fn set_context(&self, key: &str, value: Value) {
        self.context.write().insert(key.to_owned(), value);
        self.dirty_context.lock().insert(key.to_owned());
    }

    // ── conversation history ─────────────────────────────────────────

    /// Append one line to an agent's history. In-memory, no I/O.
    pub fn append_to_history(&self, agent: &str, role: &str, content: &str) {
        self.history
            .write()
            .entry(agent.to_owned())
            .or_default()
            .push(HistoryEntry {
                role: role.to_owned(),
                content: content.to_owned(),
            });
        *self.history_dirty.lock() = true;
    }

    /// A copy of one agent's history.
    pub fn get_history(&self, agent: &str) -> Vec<HistoryEntry> {
        self.history.read().get(agent).cloned().unwrap_or_default()
    }

    /// A copy of every agent's history.
    pub fn all_histories(&self) -> HashMap<String, Vec<HistoryEntry>> {
        self.history.read().clone()
    }

    // ── slots and tool outputs (session-scoped) ──────────────────────

    /// Merge structured slots returned by a tool into the session.
    pub fn update_slots(&self, slots: &serde_json::Map<String, Value>) {
        let mut context = self.context.write();
        let entry = context
            .entry("slots".to_owned())
            .or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(existing) = entry {
            for (k, v) in slots {
                existing.insert(k.clone(), v.clone());
            }
        }
        drop(context);
        self.dirty_context.lock().insert("slots".to_owned());
    }

    pub fn slots(&self) -> serde_json::Map<String, Value> {
        match self.context.read().get("slots") {
            Some(Value::Object(map)) => map.clone(),
            _ => Default::default(),
        }
    }

    /// Keep a compact record of a tool's output for prompt context.
    pub fn persist_tool_output(&self, tool_name: &str, result: &Value) {
        let compact = result
            .get("summary")
            .cloned()
            .unwrap_or_else(|| Value::String(truncate_json(result, 500)));
        let mut context = self.context.write();
        let entry = context
            .entry("tool_outputs".to_owned())
            .or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(outputs) = entry {
            outputs.insert(tool_name.to_owned(), compact);
        }
        drop(context);
        self.dirty_context.lock().insert("tool_outputs".to_owned());
    }

    // ── recent user messages (bounded deque) ─────────────────────────

    /// Record a user utterance, keeping only the most recent `limit`.
    pub fn push_user_message(&self, text: &str, limit: usize) {
        let mut recent: Vec<String> = self
            .get_core("user_message_history")
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        recent.push(text.to_owned());
        if recent.len() > limit {
            let excess = recent.len() - limit;
            recent.drain(..excess);
        }
        self.set_core(
            "user_message_history",
            serde_json::to_value(recent).unwrap_or(Value::Null),
        );
    }

    // ── durability ───────────────────────────────────────────────────

    /// Collect dirty entries and clear the dirty sets.
    fn take_dirty(&self) -> (Vec<(String, Value)>, Vec<(String, Value)>) {
        let mut core_entries = Vec::new();
        {
            let core = self.core.read();
            for key in self.dirty_core.lock().drain() {
                core_entries.push((key.clone(), core.get(&key).cloned().unwrap_or(Value::Null)));
            }
        }
        if std::mem::take(&mut *self.history_dirty.lock()) {
            let snapshot = serde_json::to_value(&*self.history.read()).unwrap_or(Value::Null);
            core_entries.push((HISTORY_KEY.to_owned(), snapshot));
        }

        let mut context_entries = Vec::new();
        {
            let context = self.context.read();
            for key in self.dirty_context.lock().drain() {
                context_entries.push((
                    key.clone(),
                    context.get(&key).cloned().unwrap_or(Value::Null),
                ));
            }
        }
        (core_entries, context_entries)
    }

    /// Push all dirty state to the store and wait for the result.
    /// Used on the teardown path; errors are returned for logging only.
    pub async fn flush(&self) -> Result<()> {
        let (core_entries, context_entries) = self.take_dirty();
        if !core_entries.is_empty() {
            self.provider
                .set_many(Namespace::Core, &self.session_id, core_entries)
                .await?;
        }
        if !context_entries.is_empty() {
            self.provider
                .set_many(Namespace::Context, &self.session_id, context_entries)
                .await?;
        }
        Ok(())
    }

    /// Fire-and-forget flush for the hot path: snapshot dirty state now,
    /// write in a background task, log on failure.
    pub fn flush_background(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.flush().await {
                tracing::warn!(session_id = %this.session_id, error = %e, "background state flush failed");
            }
        });
    }
}

fn truncate_json(value: &Value, max_chars: usize) -> String {
    let mut s = value.to_string();
    if s.len() > max_chars {
        // Back up to a char boundary.
        let mut end = max_chars;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::LocalMemoryStore;
    use serde_json::json;

    fn mem() -> SessionMemory {
        SessionMemory::new("s1", Arc::new(LocalMemoryStore::new()))
    }

    #[test]
    fn get_prefers_core_over_context() {
        let m = mem();
        m.set_context("k", json!("ctx"));
        m.set_core("k", json!("core"));
        assert_eq!(m.get("k"), Some(json!("core")));
    }

    #[test]
    fn history_append_and_copy() {
        let m = mem();
        m.append_to_history("Concierge", "user", "hello");
        m.append_to_history("Concierge", "assistant", "hi there");
        m.append_to_history("Advisor", "user", "invest");

        let h = m.get_history("Concierge");
        assert_eq!(h.len(), 2);
        assert_eq!(h[0].role, "user");
        assert_eq!(m.all_histories().len(), 2);

        // Mutating the copy does not affect the stored history.
        let mut copy = m.get_history("Concierge");
        copy.push(HistoryEntry {
            role: "user".into(),
            content: "extra".into(),
        });
        assert_eq!(m.get_history("Concierge").len(), 2);
    }

    #[test]
    fn slots_merge() {
        let m = mem();
        let mut first = serde_json::Map::new();
        first.insert("customer_name".into(), json!("Jane"));
        m.update_slots(&first);

        let mut second = serde_json::Map::new();
        second.insert("account".into(), json!("A-1"));
        m.update_slots(&second);

        let slots = m.slots();
        assert_eq!(slots["customer_name"], json!("Jane"));
        assert_eq!(slots["account"], json!("A-1"));
    }

    #[test]
    fn user_message_deque_is_bounded() {
        let m = mem();
        for i in 0..8 {
            m.push_user_message(&format!("msg {i}"), 5);
        }
        let recent: Vec<String> =
            serde_json::from_value(m.get_core("user_message_history").unwrap()).unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0], "msg 3");
        assert_eq!(recent[4], "msg 7");
    }

    #[test]
    fn tool_output_uses_summary_when_present() {
        let m = mem();
        m.persist_tool_output("lookup_customer", &json!({"summary": "Active VIP", "raw": [1, 2]}));
        let outputs = m.get_context("tool_outputs").unwrap();
        assert_eq!(outputs["lookup_customer"], json!("Active VIP"));
    }

    #[tokio::test]
    async fn flush_and_rehydrate_roundtrip() {
        let provider = Arc::new(LocalMemoryStore::new());
        let m = SessionMemory::new("s1", provider.clone() as Arc<dyn MemoryProvider>);
        m.set_core("active_agent", json!("Advisor"));
        m.append_to_history("Advisor", "user", "hello");
        m.set_context("slots", json!({"a": 1}));
        m.flush().await.unwrap();

        let fresh = SessionMemory::new("s1", provider as Arc<dyn MemoryProvider>);
        fresh.hydrate().await.unwrap();
        assert_eq!(fresh.get_core("active_agent"), Some(json!("Advisor")));
        assert_eq!(fresh.get_history("Advisor").len(), 1);
        assert_eq!(fresh.get_context("slots"), Some(json!({"a": 1})));
    }

    #[test]
    fn truncate_json_respects_char_boundaries() {
        let v = json!("éééééééééé");
        let s = truncate_json(&v, 5);
        assert!(s.len() <= 5);
    }
}
