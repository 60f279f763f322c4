//! `vg-gateway` — the VoiceGate runtime.
//!
//! One live conversation is a session: a WebSocket carrying audio in and
//! framed audio out, a three-lane turn engine in between, and a multi-agent
//! orchestrator driving the LLM. The lanes:
//!
//! - **Lane A (audio ingress)** — owns the speech recognizer; its vendor
//!   callbacks post barge-in probes and final transcripts, never suspending
//!   on queue work ([`engine::ingress`]).
//! - **Lane B (turn processing)** — a single cooperative loop draining the
//!   work queue, running at most one turn at a time ([`engine::turns`]).
//! - **Lane C (main)** — the scheduler itself: barge-in fan-out, foreign
//!   context scheduling, teardown ([`engine::bridge`], [`session`]).

pub mod audio;
pub mod cli;
pub mod dev;
pub mod engine;
pub mod events;
pub mod orchestrator;
pub mod pools;
pub mod session;
pub mod state;
pub mod tts;
pub mod ws;

#[cfg(test)]
pub(crate) mod testutil;
