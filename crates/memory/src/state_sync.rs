//! Orchestrator state snapshot sync.
//!
//! The READ side (`load_snapshot`) runs at turn start and orchestrator
//! startup; the WRITE side (`persist_snapshot`) runs at turn boundaries and
//! after handoffs. Both are pure over the in-memory [`SessionMemory`]
//! caches — durability is the session's background flush.
//!
//! Invariant: `persist_snapshot` is idempotent, and a persist followed by a
//! load round-trips exactly on the stable keys.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::SessionMemory;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Keys
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Literal key names used in the store. Constants instead of magic strings
/// so every usage is findable.
pub struct SessionStateKeys;

impl SessionStateKeys {
    /// Name of the currently active agent (e.g. "Concierge").
    pub const ACTIVE_AGENT: &'static str = "active_agent";
    /// Agent names visited this session (drives return greetings).
    pub const VISITED_AGENTS: &'static str = "visited_agents";
    /// User profile map: name, email, client_id, ...
    pub const SESSION_PROFILE: &'static str = "session_profile";
    pub const CLIENT_ID: &'static str = "client_id";
    pub const CALLER_NAME: &'static str = "caller_name";
    /// Tenant name for white-label scenarios.
    pub const INSTITUTION_NAME: &'static str = "institution_name";
    /// CRM/personalization data.
    pub const CUSTOMER_INTELLIGENCE: &'static str = "customer_intelligence";
    /// `{target_agent, reason, context}` when a handoff is queued.
    pub const PENDING_HANDOFF: &'static str = "pending_handoff";
    /// Context passed from the previous agent during handoff.
    pub const HANDOFF_CONTEXT: &'static str = "handoff_context";
    pub const TURN_COUNT: &'static str = "turn_count";
    pub const TOKEN_COUNTS: &'static str = "token_counts";
}

/// Profile fields promoted to top-level system vars for prompt templates.
const PROMOTED_FIELDS: [&str; 4] = [
    SessionStateKeys::CLIENT_ID,
    SessionStateKeys::CALLER_NAME,
    SessionStateKeys::CUSTOMER_INTELLIGENCE,
    SessionStateKeys::INSTITUTION_NAME,
];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingHandoff {
    pub target_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// What the orchestrator adopts at a turn boundary.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub active_agent: Option<String>,
    pub visited_agents: HashSet<String>,
    /// Template variables for prompt rendering.
    pub system_vars: serde_json::Map<String, Value>,
    pub pending_handoff: Option<PendingHandoff>,
    pub turn_count: u64,
    pub token_counts: Option<Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Load
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Read orchestrator state from the session memory.
///
/// `available_agents` validates the stored active agent; a stale name is
/// ignored with a warning rather than propagated.
pub fn load_snapshot(
    mem: &SessionMemory,
    available_agents: Option<&HashSet<String>>,
) -> SessionSnapshot {
    let mut snap = SessionSnapshot::default();

    // ── Active agent ───
    if let Some(Value::String(active)) = mem.get(SessionStateKeys::ACTIVE_AGENT) {
        match available_agents {
            Some(agents) if !agents.contains(&active) => {
                tracing::warn!(agent = %active, "stored active agent not in registry, ignoring");
            }
            _ => snap.active_agent = Some(active),
        }
    }

    // ── Visited agents ───
    if let Some(visited) = mem.get(SessionStateKeys::VISITED_AGENTS) {
        if let Ok(names) = serde_json::from_value::<Vec<String>>(visited) {
            snap.visited_agents = names.into_iter().collect();
        }
    }

    // ── Session profile (primary user context) ───
    match mem.get(SessionStateKeys::SESSION_PROFILE) {
        Some(Value::Object(profile)) => {
            snap.system_vars.insert(
                SessionStateKeys::SESSION_PROFILE.into(),
                Value::Object(profile.clone()),
            );
            // Promote commonly-used fields for prompt templates.
            if let Some(v) = profile.get("client_id") {
                snap.system_vars
                    .insert(SessionStateKeys::CLIENT_ID.into(), v.clone());
            }
            if let Some(v) = profile.get("full_name") {
                snap.system_vars
                    .insert(SessionStateKeys::CALLER_NAME.into(), v.clone());
            }
            if let Some(v) = profile.get("customer_intelligence") {
                snap.system_vars
                    .insert(SessionStateKeys::CUSTOMER_INTELLIGENCE.into(), v.clone());
            }
            if let Some(v) = profile.get("institution_name") {
                snap.system_vars
                    .insert(SessionStateKeys::INSTITUTION_NAME.into(), v.clone());
            }
        }
        _ => {
            // Fallback: individual fields when no profile was stored.
            for key in PROMOTED_FIELDS {
                if let Some(v) = mem.get(key) {
                    if !v.is_null() {
                        snap.system_vars.insert(key.into(), v);
                    }
                }
            }
        }
    }

    if let Some(v) = mem.get(SessionStateKeys::HANDOFF_CONTEXT) {
        if !v.is_null() {
            snap.system_vars
                .insert(SessionStateKeys::HANDOFF_CONTEXT.into(), v);
        }
    }

    // ── Pending handoff ───
    if let Some(pending) = mem.get(SessionStateKeys::PENDING_HANDOFF) {
        if let Ok(handoff) = serde_json::from_value::<PendingHandoff>(pending) {
            snap.pending_handoff = Some(handoff);
        }
    }

    // ── Counters ───
    if let Some(v) = mem.get(SessionStateKeys::TURN_COUNT) {
        snap.turn_count = v.as_u64().unwrap_or(0);
    }
    if let Some(v) = mem.get(SessionStateKeys::TOKEN_COUNTS) {
        if !v.is_null() {
            snap.token_counts = Some(v);
        }
    }

    snap
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persist
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Write orchestrator state back to the session memory. Idempotent.
pub fn persist_snapshot(
    mem: &SessionMemory,
    active_agent: Option<&str>,
    visited_agents: Option<&HashSet<String>>,
    system_vars: Option<&serde_json::Map<String, Value>>,
    clear_pending_handoff: bool,
) {
    if let Some(agent) = active_agent {
        mem.set_core(SessionStateKeys::ACTIVE_AGENT, Value::String(agent.into()));
    }

    if let Some(visited) = visited_agents {
        let mut names: Vec<&String> = visited.iter().collect();
        names.sort();
        mem.set_core(
            SessionStateKeys::VISITED_AGENTS,
            serde_json::to_value(names).unwrap_or(Value::Null),
        );
    }

    if let Some(vars) = system_vars {
        if let Some(profile) = vars.get(SessionStateKeys::SESSION_PROFILE) {
            mem.set_core(SessionStateKeys::SESSION_PROFILE, profile.clone());
        }
        for key in PROMOTED_FIELDS {
            if let Some(v) = vars.get(key) {
                if !v.is_null() {
                    mem.set_core(key, v.clone());
                }
            }
        }
    }

    if clear_pending_handoff {
        mem.delete_core(SessionStateKeys::PENDING_HANDOFF);
    }

    tracing::debug!(agent = ?active_agent, "state synced to memory");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::LocalMemoryStore;
    use std::sync::Arc;

    use serde_json::json;

    fn mem() -> SessionMemory {
        SessionMemory::new("s1", Arc::new(LocalMemoryStore::new()))
    }

    fn agents(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn persist_then_load_roundtrips() {
        let m = mem();
        let visited = agents(&["Concierge", "Advisor"]);
        let mut vars = serde_json::Map::new();
        vars.insert(
            SessionStateKeys::SESSION_PROFILE.into(),
            json!({"client_id": "X1", "full_name": "Jane Roe"}),
        );

        persist_snapshot(&m, Some("Advisor"), Some(&visited), Some(&vars), false);
        let snap = load_snapshot(&m, Some(&agents(&["Concierge", "Advisor"])));

        assert_eq!(snap.active_agent.as_deref(), Some("Advisor"));
        assert_eq!(snap.visited_agents, visited);
        assert_eq!(snap.system_vars[SessionStateKeys::CLIENT_ID], json!("X1"));
        assert_eq!(
            snap.system_vars[SessionStateKeys::CALLER_NAME],
            json!("Jane Roe")
        );
    }

    #[test]
    fn persist_is_idempotent() {
        let m = mem();
        let visited = agents(&["A"]);
        persist_snapshot(&m, Some("A"), Some(&visited), None, false);
        persist_snapshot(&m, Some("A"), Some(&visited), None, false);
        let snap = load_snapshot(&m, None);
        assert_eq!(snap.active_agent.as_deref(), Some("A"));
        assert_eq!(snap.visited_agents.len(), 1);
    }

    #[test]
    fn stale_active_agent_is_ignored() {
        let m = mem();
        persist_snapshot(&m, Some("Ghost"), None, None, false);
        let snap = load_snapshot(&m, Some(&agents(&["Concierge"])));
        assert_eq!(snap.active_agent, None);
    }

    #[test]
    fn pending_handoff_load_and_clear() {
        let m = mem();
        m.set_core(
            SessionStateKeys::PENDING_HANDOFF,
            json!({"target_agent": "Advisor", "reason": "user request"}),
        );

        let snap = load_snapshot(&m, None);
        let pending = snap.pending_handoff.unwrap();
        assert_eq!(pending.target_agent, "Advisor");
        assert_eq!(pending.reason.as_deref(), Some("user request"));

        persist_snapshot(&m, None, None, None, true);
        let snap = load_snapshot(&m, None);
        assert!(snap.pending_handoff.is_none());
    }

    #[test]
    fn profile_fallback_reads_individual_fields() {
        let m = mem();
        m.set_core(SessionStateKeys::CLIENT_ID, json!("C-7"));
        m.set_core(SessionStateKeys::INSTITUTION_NAME, json!("Acme Bank"));

        let snap = load_snapshot(&m, None);
        assert_eq!(snap.system_vars[SessionStateKeys::CLIENT_ID], json!("C-7"));
        assert_eq!(
            snap.system_vars[SessionStateKeys::INSTITUTION_NAME],
            json!("Acme Bank")
        );
        assert!(!snap.system_vars.contains_key(SessionStateKeys::SESSION_PROFILE));
    }
}
