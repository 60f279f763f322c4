//! Multi-agent orchestrator.
//!
//! Owns the scenario (agent registry + handoff map), the active agent, and
//! per-session orchestration state. `process_turn` drives one exchange:
//! sync state from the store, assemble messages (cross-agent context,
//! envelope expansion, handoff instructions), stream the LLM into
//! sentence-sized TTS chunks, run the bounded tool loop, execute handoffs
//! with the new agent answering directly, record the turn, and sync state
//! back.

pub mod llm;
pub mod registry;
pub mod splitter;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};

use vg_agents::agent::{AgentDescriptor, ModelMode};
use vg_agents::handoff::{HandoffResolution, HandoffService, HandoffType};
use vg_agents::scenario::Scenario;
use vg_agents::tools::{ToolOutcome, ToolRegistry};
use vg_domain::capability::{ChatRequest, LlmClient};
use vg_domain::config::{EngineConfig, LlmConfig};
use vg_domain::error::{Error, Result};
use vg_domain::message::{Message, ToolCall};
use vg_memory::{load_snapshot, persist_snapshot, HistoryEntry, SessionStateKeys};
use vg_protocol::events::SessionEventKind;

use crate::session::context::SessionContext;

use llm::{drive_stream, StreamParams};
use registry::SessionUpdateThrottle;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One turn's input, transient.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub turn_id: String,
    pub user_text: String,
    pub language: String,
    /// Extra template variables for this turn (previous agent, handoff
    /// context, system vars).
    pub metadata: serde_json::Map<String, Value>,
}

impl TurnRecord {
    pub fn new(user_text: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            turn_id: uuid::Uuid::new_v4().to_string(),
            user_text: user_text.into(),
            language: language.into(),
            metadata: Default::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnResult {
    pub response_text: String,
    pub tool_calls: Vec<ToolCall>,
    pub agent_name: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub interrupted: bool,
    pub error: Option<String>,
}

/// Callbacks a turn fires into the engine/transport layer.
#[derive(Clone)]
pub struct TurnHooks {
    /// Sentence-sized text ready for synthesis. Awaited: chunk dispatch is
    /// the turn's pacing point.
    pub on_tts_chunk: Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>,
    pub on_tool_start: Arc<dyn Fn(&str, &Value) + Send + Sync>,
    pub on_tool_end: Arc<dyn Fn(&str, &Value) + Send + Sync>,
}

impl TurnHooks {
    pub fn noop() -> Self {
        Self {
            on_tts_chunk: Arc::new(|_| Box::pin(async {})),
            on_tool_start: Arc::new(|_, _| {}),
            on_tool_end: Arc::new(|_, _| {}),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Orchestrator {
    context: Arc<SessionContext>,
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    cfg: LlmConfig,
    engine_cfg: EngineConfig,

    scenario: RwLock<Arc<Scenario>>,
    /// Cached handoff service; cleared on scenario swap.
    handoff: Mutex<Option<Arc<HandoffService>>>,

    active_agent: RwLock<String>,
    visited: Mutex<HashSet<String>>,
    system_vars: Mutex<serde_json::Map<String, Value>>,
    last_user_message: Mutex<String>,

    session_update: SessionUpdateThrottle,
}

impl Orchestrator {
    pub fn new(
        context: Arc<SessionContext>,
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
        scenario: Scenario,
        cfg: LlmConfig,
        engine_cfg: EngineConfig,
    ) -> Self {
        let start = scenario.start_agent.clone();
        let scenario = Arc::new(scenario);
        if let Some(agent) = scenario.get(&start) {
            context.set_active_agent(agent);
        }
        context.latency.set_agent(&start);
        let min_interval = Duration::from_millis(engine_cfg.session_update_min_interval_ms);
        Self {
            context,
            llm,
            tools,
            cfg,
            engine_cfg,
            scenario: RwLock::new(scenario),
            handoff: Mutex::new(None),
            active_agent: RwLock::new(start),
            visited: Mutex::new(HashSet::new()),
            system_vars: Mutex::new(Default::default()),
            last_user_message: Mutex::new(String::new()),
            session_update: SessionUpdateThrottle::new(min_interval),
        }
    }

    pub fn scenario(&self) -> Arc<Scenario> {
        Arc::clone(&self.scenario.read())
    }

    pub fn active_agent_name(&self) -> String {
        self.active_agent.read().clone()
    }

    pub fn visited_agents(&self) -> HashSet<String> {
        self.visited.lock().clone()
    }

    fn handoff_service(&self) -> Arc<HandoffService> {
        let mut cached = self.handoff.lock();
        if let Some(svc) = cached.as_ref() {
            return Arc::clone(svc);
        }
        let scenario = self.scenario();
        let svc = Arc::new(HandoffService::new(
            scenario.handoff_map.clone(),
            scenario.agent_names(),
            scenario.greet_on_switch,
        ));
        *cached = Some(Arc::clone(&svc));
        svc
    }

    // ── state synchronization ────────────────────────────────────────

    /// Adopt store state at turn start: active agent (validated), visited
    /// set, system vars, counters. A pending handoff whose target exists is
    /// honored and cleared.
    pub fn sync_from_memory(&self) {
        let scenario = self.scenario();
        let names = scenario.agent_names();
        let snap = load_snapshot(&self.context.memory, Some(&names));

        if let Some(active) = snap.active_agent {
            *self.active_agent.write() = active;
        }

        if let Some(pending) = snap.pending_handoff {
            if names.contains(&pending.target_agent) {
                tracing::info!(target = %pending.target_agent, "honoring pending handoff");
                *self.active_agent.write() = pending.target_agent.clone();
                if let Some(ctx) = pending.context.or(pending.reason) {
                    self.system_vars
                        .lock()
                        .insert(SessionStateKeys::HANDOFF_CONTEXT.into(), json!(ctx));
                }
                persist_snapshot(
                    &self.context.memory,
                    Some(&pending.target_agent),
                    None,
                    None,
                    true,
                );
            }
        }

        self.visited.lock().extend(snap.visited_agents);
        {
            let mut vars = self.system_vars.lock();
            for (k, v) in snap.system_vars {
                vars.insert(k, v);
            }
        }

        let (input_tokens, output_tokens) = snap
            .token_counts
            .as_ref()
            .map(|v| {
                (
                    v.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
                    v.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
                )
            })
            .unwrap_or((0, 0));
        self.context
            .latency
            .restore(snap.turn_count, input_tokens, output_tokens);

        if let Some(agent) = scenario.get(&self.active_agent_name()) {
            self.context.set_active_agent(agent);
        }
    }

    /// Write orchestrator state back at turn end; durability is a
    /// background flush.
    pub fn sync_to_memory(&self) {
        let active = self.active_agent_name();
        let visited = self.visited.lock().clone();
        let vars = self.system_vars.lock().clone();
        let mem = &self.context.memory;

        persist_snapshot(mem, Some(&active), Some(&visited), Some(&vars), false);
        mem.set_core(
            SessionStateKeys::TURN_COUNT,
            json!(self.context.latency.turn_count()),
        );
        let (input_tokens, output_tokens) = self.context.latency.token_counts();
        mem.set_core(
            SessionStateKeys::TOKEN_COUNTS,
            json!({"input_tokens": input_tokens, "output_tokens": output_tokens}),
        );
        mem.flush_background();
    }

    // ── message assembly ─────────────────────────────────────────────

    fn expand_entry(entry: &HistoryEntry) -> Message {
        // Complex turns were persisted as serialized message envelopes.
        if (entry.role == "assistant" || entry.role == "tool") && entry.content.starts_with('{') {
            if let Ok(msg) = serde_json::from_str::<Message>(&entry.content) {
                if msg.is_complex() {
                    return msg;
                }
            }
        }
        match entry.role.as_str() {
            "assistant" => Message::assistant(&entry.content),
            "tool" => Message::tool_result("unknown", &entry.content),
            _ => Message::user(&entry.content),
        }
    }

    fn agent_history(&self, agent_name: &str) -> Vec<Message> {
        self.context
            .memory
            .get_history(agent_name)
            .iter()
            .map(Self::expand_entry)
            .collect()
    }

    /// The active agent's history, prepended with substantive user
    /// messages from other agents (length > 10, non-greeting-like,
    /// deduplicated by lowercased content).
    fn conversation_history(&self, active: &str) -> Vec<Message> {
        let all = self.context.memory.all_histories();
        let mut seen: HashSet<String> = HashSet::new();
        let mut cross: Vec<Message> = Vec::new();

        for (agent_name, entries) in &all {
            if agent_name == active {
                continue;
            }
            for entry in entries {
                if entry.role != "user" {
                    continue;
                }
                let content = entry.content.trim();
                if content.len() <= 10 || content.to_lowercase().starts_with("welcome") {
                    continue;
                }
                if seen.insert(content.to_lowercase()) {
                    cross.push(Message::user(content));
                }
            }
        }

        cross.extend(self.agent_history(active));
        cross
    }

    fn build_messages(
        &self,
        agent: &AgentDescriptor,
        scenario: &Scenario,
        history: Vec<Message>,
        user_text: Option<&str>,
        metadata: &serde_json::Map<String, Value>,
    ) -> Vec<Message> {
        let mut vars = self.system_vars.lock().clone();
        for (k, v) in metadata {
            vars.insert(k.clone(), v.clone());
        }

        let mut system = agent.render_prompt(&vars);
        if let Some(instructions) = scenario.build_handoff_instructions(&agent.name) {
            if system.is_empty() {
                system = instructions;
            } else {
                system = format!("{system}\n\n{instructions}");
            }
        }

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system));
        messages.extend(history);
        if let Some(text) = user_text {
            if !text.trim().is_empty() {
                messages.push(Message::user(text));
            }
        }
        messages
    }

    // ── handoffs ─────────────────────────────────────────────────────

    /// Apply a resolved handoff: flip state, pick the greeting, notify,
    /// persist. Returns the selected greeting (None for discrete mode).
    fn execute_handoff(
        &self,
        resolution: &HandoffResolution,
        trigger: &str,
    ) -> Result<Option<String>> {
        let scenario = self.scenario();
        let target = scenario
            .get(&resolution.target_agent)
            .ok_or_else(|| Error::AgentNotFound(resolution.target_agent.clone()))?;

        let previous = self.active_agent_name();
        let is_first_visit = {
            let mut visited = self.visited.lock();
            let first = !visited.contains(&resolution.target_agent);
            visited.insert(resolution.target_agent.clone());
            first
        };

        *self.active_agent.write() = resolution.target_agent.clone();
        self.context.set_active_agent(Arc::clone(&target));
        self.context
            .latency
            .reset_for_agent_switch(&resolution.target_agent);

        let vars = {
            let mut vars = self.system_vars.lock();
            vars.insert("previous_agent".into(), json!(previous));
            if let Some(ctx) = resolution.context.clone().or_else(|| resolution.reason.clone()) {
                vars.insert(SessionStateKeys::HANDOFF_CONTEXT.into(), json!(ctx));
            }
            vars.clone()
        };

        let greeting = self.handoff_service().select_greeting(
            &target,
            is_first_visit,
            resolution.greet_on_switch,
            &vars,
        );

        self.context.events.emit(
            SessionEventKind::AgentChange,
            "orchestrator",
            json!({
                "from": previous,
                "to": resolution.target_agent,
                "first_visit": is_first_visit,
                "trigger": trigger,
            }),
        );

        let visited = self.visited.lock().clone();
        persist_snapshot(
            &self.context.memory,
            Some(&resolution.target_agent),
            Some(&visited),
            Some(&vars),
            false,
        );
        // The system prompt changed; the connection needs a refresh.
        self.session_update.mark_pending();

        tracing::info!(
            from = %previous,
            to = %resolution.target_agent,
            trigger,
            first_visit = is_first_visit,
            greeting = greeting.is_some(),
            "agent handoff"
        );

        Ok(greeting)
    }

    /// Programmatic switch (scenario tools, operator action).
    pub fn switch_agent(&self, target: &str, context_note: Option<String>) -> Result<Option<String>> {
        let scenario = self.scenario();
        if !scenario.agents.contains_key(target) {
            return Err(Error::AgentNotFound(target.to_owned()));
        }
        let resolution = HandoffResolution {
            target_agent: target.to_owned(),
            handoff_type: if scenario.greet_on_switch {
                HandoffType::Announced
            } else {
                HandoffType::Discrete
            },
            greet_on_switch: scenario.greet_on_switch,
            reason: None,
            context: context_note,
        };
        self.execute_handoff(&resolution, &format!("manual_switch_{target}"))
    }

    // ── scenario hot-swap ────────────────────────────────────────────

    /// Replace the agent set mid-session. The next turn sees the new
    /// registry; visited agents reset for a fresh experience.
    pub fn update_scenario(&self, scenario: Scenario, start_agent: Option<&str>) {
        let scenario = Arc::new(scenario);
        let old_active = self.active_agent_name();
        {
            *self.scenario.write() = Arc::clone(&scenario);
            *self.handoff.lock() = None;
            self.visited.lock().clear();
        }

        let new_active = if let Some(start) = start_agent {
            start.to_owned()
        } else if scenario.agents.contains_key(&old_active) {
            old_active.clone()
        } else {
            let mut names: Vec<String> = scenario.agents.keys().cloned().collect();
            names.sort();
            names
                .into_iter()
                .next()
                .unwrap_or_else(|| scenario.start_agent.clone())
        };

        *self.active_agent.write() = new_active.clone();
        if let Some(agent) = scenario.get(&new_active) {
            self.context.set_active_agent(agent);
        }
        self.context.latency.set_agent(&new_active);

        // The LLM connection must see the new system prompt on its very
        // next response.
        self.session_update.mark_pending();

        let mut names: Vec<String> = scenario.agents.keys().cloned().collect();
        names.sort();
        self.context.events.emit(
            SessionEventKind::AgentInventory,
            "orchestrator",
            json!({"scenario": scenario.name, "agents": names, "active": new_active}),
        );

        tracing::info!(
            scenario = %scenario.name,
            from = %old_active,
            to = %new_active,
            "scenario updated"
        );
    }

    /// Greeting for the session's opening agent (played at connect).
    /// Returning callers with a restored visit to this agent get the
    /// return greeting.
    pub fn session_greeting(&self) -> Option<String> {
        self.sync_from_memory();
        let agent = self.scenario().get(&self.active_agent_name())?;
        let vars = self.system_vars.lock().clone();
        let is_first_visit = !self.visited.lock().contains(&agent.name);
        self.handoff_service()
            .select_greeting(&agent, is_first_visit, true, &vars)
    }

    fn emit_session_update(&self) {
        self.context.events.emit(
            SessionEventKind::SessionUpdated,
            "orchestrator",
            json!({
                "agent": self.active_agent_name(),
                "scenario": self.scenario().name,
            }),
        );
    }

    // ── turn processing ──────────────────────────────────────────────

    /// Drive one conversation turn to completion or cancellation.
    pub async fn process_turn(&self, record: TurnRecord, hooks: &TurnHooks) -> TurnResult {
        self.context.clear_cancel();
        let turn_number = self.context.latency.start_turn();
        self.sync_from_memory();
        *self.last_user_message.lock() = record.user_text.clone();

        let scenario = self.scenario();
        let mut agent_name = self.active_agent_name();
        let mut agent = match scenario.get(&agent_name) {
            Some(agent) => agent,
            None => {
                return self.finish_turn(
                    String::new(),
                    Vec::new(),
                    agent_name.clone(),
                    Some(format!("agent '{agent_name}' not found")),
                )
            }
        };
        self.context.latency.set_agent(&agent_name);

        tracing::debug!(
            session = %self.context.session_short(),
            turn = turn_number,
            agent = %agent_name,
            text_len = record.user_text.len(),
            "turn started"
        );

        let mem = Arc::clone(&self.context.memory);

        // Copy the history before recording the current utterance, or the
        // user message would appear twice in the request.
        let history = self.conversation_history(&agent_name);
        if !record.user_text.trim().is_empty() {
            mem.append_to_history(&agent_name, "user", &record.user_text);
            mem.push_user_message(&record.user_text, self.engine_cfg.user_history_limit);
        }

        let mut messages = self.build_messages(
            &agent,
            &scenario,
            history,
            Some(record.user_text.as_str()),
            &record.metadata,
        );
        let mut tool_defs = self
            .tools
            .definitions_for_agent(&agent, &scenario.handoff_map, true);

        let params = StreamParams {
            turn_timeout: Duration::from_secs(self.cfg.turn_timeout_secs),
            chunk_timeout: Duration::from_secs(self.cfg.chunk_timeout_secs),
            ..Default::default()
        };

        let mut response_text = String::new();
        let mut all_tool_calls: Vec<ToolCall> = Vec::new();
        let mut error: Option<String> = None;
        let mut handoff_greeting: Option<String> = None;
        let mut awaiting_post_handoff = false;

        let mut iteration = 0usize;
        'turn: while iteration < self.cfg.max_tool_iterations {
            self.context.latency.record_llm_request_start();
            let req = ChatRequest {
                messages: messages.clone(),
                tools: tool_defs.clone(),
                model: agent.model_for_mode(ModelMode::Cascade).clone(),
            };

            let latency = &self.context.latency;
            let outcome = match drive_stream(
                self.llm.as_ref(),
                req,
                &self.context.cancel,
                &params,
                &|| latency.record_llm_first_token(),
                hooks.on_tts_chunk.as_ref(),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(agent = %agent_name, error = %e, "LLM processing failed");
                    if awaiting_post_handoff {
                        if let Some(greeting) = handoff_greeting.clone() {
                            (hooks.on_tts_chunk)(greeting.clone()).await;
                            response_text = greeting;
                            break 'turn;
                        }
                    }
                    error = Some(e.to_string());
                    let apology = self.cfg.apology.clone();
                    (hooks.on_tts_chunk)(apology.clone()).await;
                    response_text = apology;
                    break 'turn;
                }
            };

            self.context.latency.add_tokens(
                outcome.usage.input_tokens as u64,
                outcome.usage.output_tokens as u64,
            );
            response_text = outcome.text.clone();
            all_tool_calls.extend(outcome.tool_calls.iter().cloned());

            // The agent answering right after a handoff must actually say
            // something; a stub falls back to the greeting.
            if awaiting_post_handoff {
                awaiting_post_handoff = false;
                if response_text.trim().len() < 10 {
                    if let Some(greeting) = handoff_greeting.clone() {
                        tracing::warn!(
                            agent = %agent_name,
                            len = response_text.trim().len(),
                            "post-handoff response too short, using greeting"
                        );
                        (hooks.on_tts_chunk)(greeting.clone()).await;
                        response_text = greeting;
                        break 'turn;
                    }
                }
            }

            if outcome.cancelled {
                break 'turn;
            }

            let svc = self.handoff_service();
            let mut handoff_call: Option<ToolCall> = None;
            let mut plain_calls: Vec<ToolCall> = Vec::new();
            for call in &outcome.tool_calls {
                if svc.is_handoff(&call.tool_name) {
                    if handoff_call.is_none() {
                        handoff_call = Some(call.clone());
                    }
                } else {
                    plain_calls.push(call.clone());
                }
            }

            if let Some(call) = handoff_call {
                (hooks.on_tool_start)(&call.tool_name, &call.arguments);
                let switched = svc
                    .resolve(&call.tool_name, &call.arguments)
                    .and_then(|resolution| {
                        self.execute_handoff(&resolution, &call.tool_name)
                            .map(|greeting| (resolution, greeting))
                    });

                match switched {
                    Ok((resolution, greeting)) => {
                        (hooks.on_tool_end)(
                            &call.tool_name,
                            &json!({
                                "handoff": true,
                                "target_agent": resolution.target_agent,
                                "handoff_type": if resolution.greet_on_switch { "announced" } else { "discrete" },
                                "success": true,
                            }),
                        );

                        // Let the new agent answer the user's question
                        // directly instead of the old agent narrating the
                        // transition.
                        agent_name = resolution.target_agent.clone();
                        agent = match self.scenario().get(&agent_name) {
                            Some(agent) => agent,
                            None => break 'turn,
                        };
                        handoff_greeting = greeting;

                        let new_history = self.agent_history(&agent_name);
                        let user_text = if new_history.is_empty()
                            && !record.user_text.trim().is_empty()
                        {
                            // First visit: the user's current utterance
                            // explains why the handoff happened.
                            mem.append_to_history(&agent_name, "user", &record.user_text);
                            Some(record.user_text.as_str())
                        } else {
                            None
                        };

                        messages = self.build_messages(
                            &agent,
                            &scenario,
                            new_history,
                            user_text,
                            &record.metadata,
                        );
                        tool_defs = self
                            .tools
                            .definitions_for_agent(&agent, &scenario.handoff_map, true);
                        awaiting_post_handoff = true;
                        iteration += 1;
                        continue 'turn;
                    }
                    Err(e) => {
                        tracing::warn!(tool = %call.tool_name, error = %e, "handoff failed");
                        (hooks.on_tool_end)(
                            &call.tool_name,
                            &json!({"handoff": true, "success": false, "error": e.to_string()}),
                        );
                        if plain_calls.is_empty() {
                            break 'turn;
                        }
                    }
                }
            }

            if plain_calls.is_empty() {
                // No tool calls: the streamed text is the final answer.
                break 'turn;
            }

            // ── Non-handoff tool dispatch ────────────────────────────
            let assistant_msg = Message::assistant_tool_calls(&outcome.text, plain_calls.clone());
            if let Ok(envelope) = serde_json::to_string(&assistant_msg) {
                mem.append_to_history(&agent_name, "assistant", &envelope);
            }
            messages.push(assistant_msg);

            for call in &plain_calls {
                (hooks.on_tool_start)(&call.tool_name, &call.arguments);

                let mut args = call.arguments.clone();
                if let Value::Object(map) = &mut args {
                    // Tools personalize from the already-loaded profile
                    // instead of re-querying.
                    if let Some(profile) = mem.get(SessionStateKeys::SESSION_PROFILE) {
                        map.insert("_session_profile".into(), profile);
                    }
                }

                let result = match self.tools.execute(&call.tool_name, args).await {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::error!(tool = %call.tool_name, error = %e, "tool execution failed");
                        json!({"error": e.to_string(), "tool_name": call.tool_name})
                    }
                };

                {
                    let view = ToolOutcome(&result);
                    if let Some(slots) = view.slots() {
                        mem.update_slots(slots);
                    }
                    if view.should_interrupt_playback() {
                        if self.tools.is_transfer(&call.tool_name) {
                            self.context.cancel.set();
                        } else {
                            tracing::debug!(
                                tool = %call.tool_name,
                                "ignoring should_interrupt_playback from non-transfer tool"
                            );
                        }
                    }
                }
                mem.persist_tool_output(&call.tool_name, &result);
                (hooks.on_tool_end)(&call.tool_name, &result);

                let tool_msg = Message::tool_result(&call.call_id, result.to_string());
                if let Ok(envelope) = serde_json::to_string(&tool_msg) {
                    mem.append_to_history(&agent_name, "tool", &envelope);
                }
                messages.push(tool_msg);
            }

            if self.context.cancel.is_set() {
                // Cancelled during tools: results stand, but no follow-up
                // LLM call.
                break 'turn;
            }

            iteration += 1;
            if iteration >= self.cfg.max_tool_iterations {
                tracing::warn!(
                    max = self.cfg.max_tool_iterations,
                    "tool loop reached max iterations"
                );
            }
        }

        // ── Record & finalize ────────────────────────────────────────
        if error.is_none() && !response_text.trim().is_empty() {
            mem.append_to_history(&agent_name, "assistant", &response_text);
            self.context.events.emit(
                SessionEventKind::AssistantTranscript,
                "orchestrator",
                json!({"text": response_text, "agent": agent_name}),
            );
        }

        self.finish_turn(response_text, all_tool_calls, agent_name, error)
    }

    fn finish_turn(
        &self,
        response_text: String,
        tool_calls: Vec<ToolCall>,
        agent_name: String,
        error: Option<String>,
    ) -> TurnResult {
        self.sync_to_memory();
        if self.session_update.take_pending() {
            self.emit_session_update();
        }

        let metrics = self.context.latency.finish_turn();
        self.context
            .events
            .emit_turn_metrics(serde_json::to_value(&metrics).unwrap_or_default());

        let (input_tokens, output_tokens) = self.context.latency.token_counts();
        TurnResult {
            response_text,
            tool_calls,
            agent_name,
            input_tokens,
            output_tokens,
            interrupted: self.context.cancel.is_set(),
            error,
        }
    }
}
