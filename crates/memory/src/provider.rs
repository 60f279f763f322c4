use std::collections::HashMap;

use serde_json::Value;

use vg_domain::error::Result;

/// The two key namespaces of the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Persistent across reconnects (`corememory/{session}`).
    Core,
    /// Session-scoped transient (`context/{session}`).
    Context,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Core => "corememory",
            Namespace::Context => "context",
        }
    }
}

/// Backend abstraction over the durable key/value store.
///
/// Keys are literal strings; values are JSON. Implementations must be safe
/// to share across sessions — per-session keying prevents cross-session
/// writes.
#[async_trait::async_trait]
pub trait MemoryProvider: Send + Sync {
    async fn get(&self, ns: Namespace, session_id: &str, key: &str) -> Result<Option<Value>>;

    async fn set(&self, ns: Namespace, session_id: &str, key: &str, value: Value) -> Result<()>;

    async fn delete(&self, ns: Namespace, session_id: &str, key: &str) -> Result<()>;

    /// Write a batch of keys in one call (the flush path).
    async fn set_many(
        &self,
        ns: Namespace,
        session_id: &str,
        entries: Vec<(String, Value)>,
    ) -> Result<()>;

    /// Read every key in a namespace (the hydrate path).
    async fn load_namespace(
        &self,
        ns: Namespace,
        session_id: &str,
    ) -> Result<HashMap<String, Value>>;
}
