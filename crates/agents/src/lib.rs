//! `vg-agents` — agent definitions and the machinery around them.
//!
//! An [`AgentDescriptor`] is immutable once loaded: prompt and greeting
//! templates, voice, model parameters, tool names, and outgoing handoff
//! edges. A [`Scenario`] is a named set of agents plus a handoff map and a
//! start agent, hot-swappable at runtime. [`HandoffService`] resolves
//! handoff tool calls and selects greetings; [`ToolRegistry`] owns the
//! `execute(name, args)` contract.

pub mod agent;
pub mod handoff;
pub mod scenario;
pub mod tools;

pub use agent::{AgentDescriptor, ModelMode};
pub use handoff::{HandoffResolution, HandoffService, GENERIC_HANDOFF_TOOL};
pub use scenario::Scenario;
pub use tools::{Tool, ToolOutcome, ToolRegistry};
