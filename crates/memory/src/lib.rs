//! `vg-memory` — durable session state for VoiceGate.
//!
//! The store is a namespaced key/value service keyed by session:
//!
//! | Namespace | Path prefix | Lifetime |
//! |-----------|-------------------------|---------------------------------|
//! | `Core`    | `corememory/{session}`  | survives reconnects             |
//! | `Context` | `context/{session}`     | per-session transient           |
//!
//! [`MemoryProvider`] abstracts the backend ([`RestMemoryClient`] in
//! production, [`LocalMemoryStore`] for dev/tests). [`SessionMemory`] is the
//! per-session manager the hot path talks to: all reads and writes hit an
//! in-process cache, and durability flushes are fire-and-forget.
//! [`state_sync`] holds the pure snapshot load/persist used by the
//! orchestrator at turn boundaries.

pub mod mem;
pub mod provider;
pub mod rest;
pub mod session;
pub mod state_sync;

pub use mem::LocalMemoryStore;
pub use provider::{MemoryProvider, Namespace};
pub use rest::RestMemoryClient;
pub use session::{HistoryEntry, SessionMemory};
pub use state_sync::{
    load_snapshot, persist_snapshot, PendingHandoff, SessionSnapshot, SessionStateKeys,
};

use std::sync::Arc;

use vg_domain::config::{MemoryConfig, MemoryTransport};
use vg_domain::error::Result;

/// Create the appropriate [`MemoryProvider`] from config.
pub fn create_provider(cfg: &MemoryConfig) -> Result<Arc<dyn MemoryProvider>> {
    match cfg.transport {
        MemoryTransport::Rest => Ok(Arc::new(RestMemoryClient::new(cfg)?)),
        MemoryTransport::Local => {
            tracing::info!("using process-local memory store");
            Ok(Arc::new(LocalMemoryStore::new()))
        }
    }
}
