//! `vg-domain` — shared types for the VoiceGate workspace.
//!
//! Everything that more than one crate needs lives here: the common error
//! type, provider-agnostic chat messages and tool types, LLM stream events,
//! the capability traits behind which STT/TTS/LLM vendors sit, and the
//! configuration tree.

pub mod capability;
pub mod config;
pub mod error;
pub mod message;
pub mod stream;

pub use error::{Error, Result};
