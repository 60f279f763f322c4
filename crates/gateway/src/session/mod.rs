//! Per-session state: the typed context bundle, the resettable cancel
//! signal, and per-turn latency accounting.

pub mod cancel;
pub mod context;
pub mod latency;

pub use cancel::CancelSignal;
pub use context::{SessionContext, TransportKind};
pub use latency::{LatencyTracker, TurnMetrics};
