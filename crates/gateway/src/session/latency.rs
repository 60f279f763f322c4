//! Per-turn latency accounting.
//!
//! Checkpoints per turn: the STT recognition span (first substantive
//! partial → final), LLM time-to-first-token, TTS time-to-first-audio, and
//! turn total. Aggregated into a `turn_metrics` envelope at turn end and
//! reset per agent on handoff.

use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

/// Summary emitted at the end of a turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnMetrics {
    pub turn_number: u64,
    pub agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stt_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttft_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttfa_ms: Option<u64>,
    pub total_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Default)]
struct Inner {
    agent: String,
    turn_count: u64,
    // Session-lifetime token counters.
    input_tokens: u64,
    output_tokens: u64,
    // Per-turn checkpoints.
    stt_started: Option<Instant>,
    stt_ms: Option<u64>,
    turn_started: Option<Instant>,
    llm_started: Option<Instant>,
    ttft_ms: Option<u64>,
    ttfa_ms: Option<u64>,
}

pub struct LatencyTracker {
    inner: Mutex<Inner>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    // ── STT span (driven from the audio ingress lane) ────────────────

    /// Start the recognition timer on the first substantive partial.
    /// Subsequent partials within the same utterance are no-ops.
    pub fn start_stt_timer(&self) {
        let mut inner = self.inner.lock();
        if inner.stt_started.is_none() {
            inner.stt_started = Some(Instant::now());
        }
    }

    /// Stop the recognition timer when the final transcript arrives.
    pub fn stop_stt_timer(&self) {
        let mut inner = self.inner.lock();
        if let Some(started) = inner.stt_started.take() {
            inner.stt_ms = Some(started.elapsed().as_millis() as u64);
        }
    }

    // ── Turn lifecycle ───────────────────────────────────────────────

    /// Begin a turn: bumps the counter and resets per-turn checkpoints
    /// (the STT span measured just before the turn is kept).
    pub fn start_turn(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.turn_count += 1;
        inner.turn_started = Some(Instant::now());
        inner.llm_started = None;
        inner.ttft_ms = None;
        inner.ttfa_ms = None;
        inner.turn_count
    }

    pub fn record_llm_request_start(&self) {
        self.inner.lock().llm_started = Some(Instant::now());
    }

    pub fn record_llm_first_token(&self) {
        let mut inner = self.inner.lock();
        if inner.ttft_ms.is_none() {
            if let Some(started) = inner.llm_started {
                inner.ttft_ms = Some(started.elapsed().as_millis() as u64);
            }
        }
    }

    /// First audio frame of the turn hit the transport.
    pub fn record_first_audio(&self) {
        let mut inner = self.inner.lock();
        if inner.ttfa_ms.is_none() {
            if let Some(started) = inner.turn_started {
                inner.ttfa_ms = Some(started.elapsed().as_millis() as u64);
            }
        }
    }

    pub fn add_tokens(&self, input: u64, output: u64) {
        let mut inner = self.inner.lock();
        inner.input_tokens += input;
        inner.output_tokens += output;
    }

    /// Close the turn and produce the metrics summary.
    pub fn finish_turn(&self) -> TurnMetrics {
        let mut inner = self.inner.lock();
        let total_ms = inner
            .turn_started
            .take()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        TurnMetrics {
            turn_number: inner.turn_count,
            agent: inner.agent.clone(),
            stt_ms: inner.stt_ms.take(),
            ttft_ms: inner.ttft_ms.take(),
            ttfa_ms: inner.ttfa_ms.take(),
            total_ms,
            input_tokens: inner.input_tokens,
            output_tokens: inner.output_tokens,
        }
    }

    // ── Agent switches & persistence ─────────────────────────────────

    /// Reset per-turn checkpoints for a new agent; counters survive.
    pub fn reset_for_agent_switch(&self, agent: &str) {
        let mut inner = self.inner.lock();
        inner.agent = agent.to_owned();
        inner.llm_started = None;
        inner.ttft_ms = None;
        inner.ttfa_ms = None;
    }

    pub fn set_agent(&self, agent: &str) {
        self.inner.lock().agent = agent.to_owned();
    }

    pub fn turn_count(&self) -> u64 {
        self.inner.lock().turn_count
    }

    pub fn token_counts(&self) -> (u64, u64) {
        let inner = self.inner.lock();
        (inner.input_tokens, inner.output_tokens)
    }

    /// Restore counters persisted in the session store.
    pub fn restore(&self, turn_count: u64, input_tokens: u64, output_tokens: u64) {
        let mut inner = self.inner.lock();
        inner.turn_count = inner.turn_count.max(turn_count);
        inner.input_tokens = inner.input_tokens.max(input_tokens);
        inner.output_tokens = inner.output_tokens.max(output_tokens);
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_counter_increments() {
        let t = LatencyTracker::new();
        assert_eq!(t.start_turn(), 1);
        assert_eq!(t.start_turn(), 2);
        assert_eq!(t.turn_count(), 2);
    }

    #[test]
    fn stt_timer_is_first_partial_to_final() {
        let t = LatencyTracker::new();
        t.start_stt_timer();
        t.start_stt_timer(); // second partial is a no-op
        t.stop_stt_timer();
        t.start_turn();
        let m = t.finish_turn();
        assert!(m.stt_ms.is_some());
    }

    #[test]
    fn ttft_requires_request_start() {
        let t = LatencyTracker::new();
        t.start_turn();
        t.record_llm_first_token(); // no request start recorded yet
        let m = t.finish_turn();
        assert!(m.ttft_ms.is_none());
    }

    #[test]
    fn token_counters_accumulate_and_restore() {
        let t = LatencyTracker::new();
        t.add_tokens(100, 20);
        t.add_tokens(50, 10);
        assert_eq!(t.token_counts(), (150, 30));

        t.restore(7, 1000, 300);
        assert_eq!(t.turn_count(), 7);
        assert_eq!(t.token_counts(), (1000, 300));
        // Restore never regresses live counters.
        t.restore(2, 10, 5);
        assert_eq!(t.turn_count(), 7);
    }

    #[test]
    fn checkpoints_reset_on_agent_switch() {
        let t = LatencyTracker::new();
        t.start_turn();
        t.record_llm_request_start();
        t.record_llm_first_token();
        t.reset_for_agent_switch("Advisor");
        t.record_first_audio();
        let m = t.finish_turn();
        assert_eq!(m.agent, "Advisor");
        assert!(m.ttft_ms.is_none());
        assert!(m.ttfa_ms.is_some());
    }
}
