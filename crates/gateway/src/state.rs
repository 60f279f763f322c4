//! Shared application state passed to the WebSocket handlers.

use std::sync::Arc;

use vg_agents::{Scenario, ToolRegistry};
use vg_domain::capability::LlmClient;
use vg_domain::config::Config;
use vg_domain::error::Result;
use vg_memory::MemoryProvider;

use crate::orchestrator::registry::OrchestratorRegistry;
use crate::pools::{ClientPool, SttPool, TtsPool};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub memory: Arc<dyn MemoryProvider>,
    pub llm: Arc<dyn LlmClient>,
    pub stt_pool: Arc<SttPool>,
    pub tts_pool: Arc<TtsPool>,
    pub tools: Arc<ToolRegistry>,
    pub scenario: Arc<Scenario>,
    /// session_id → orchestrator, for externally-initiated scenario pushes.
    pub orchestrators: Arc<OrchestratorRegistry>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        memory: Arc<dyn MemoryProvider>,
        llm: Arc<dyn LlmClient>,
        stt_pool: Arc<SttPool>,
        tts_pool: Arc<TtsPool>,
        tools: Arc<ToolRegistry>,
        scenario: Arc<Scenario>,
    ) -> Self {
        Self {
            config,
            memory,
            llm,
            stt_pool,
            tts_pool,
            tools,
            scenario,
            orchestrators: Arc::new(OrchestratorRegistry::new()),
        }
    }

    /// Wire the gateway over dev capabilities: echo LLM, silence
    /// synthesis, push-driven recognition. Production embedders build the
    /// state with real adapters instead.
    pub fn dev(config: Arc<Config>, scenario: Scenario) -> Result<Self> {
        let memory = vg_memory::create_provider(&config.memory)?;
        let stt_pool: Arc<SttPool> = Arc::new(ClientPool::new(
            "stt",
            Box::new(|| Ok(Arc::new(crate::dev::DevRecognizer::new()) as _)),
        ));
        let tts_pool: Arc<TtsPool> = Arc::new(ClientPool::new(
            "tts",
            Box::new(|| Ok(Arc::new(crate::dev::DevSynthesizer) as _)),
        ));
        Ok(Self::new(
            config,
            memory,
            Arc::new(crate::dev::EchoLlm),
            stt_pool,
            tts_pool,
            Arc::new(ToolRegistry::new()),
            Arc::new(scenario),
        ))
    }

    /// Push a new scenario into a live session. Returns `false` when the
    /// session is unknown (already closed or never existed).
    pub fn push_scenario(
        &self,
        session_id: &str,
        scenario: Scenario,
        start_agent: Option<&str>,
    ) -> bool {
        match self.orchestrators.get(session_id) {
            Some(orchestrator) => {
                orchestrator.update_scenario(scenario, start_agent);
                true
            }
            None => {
                tracing::warn!(session_id, "scenario push for unknown session");
                false
            }
        }
    }
}

/// Built-in demo scenario used when no scenario file is configured.
pub fn default_scenario() -> Scenario {
    Scenario::from_toml_str(
        r#"
        name = "demo"
        start_agent = "Concierge"

        [handoff_map]
        transfer_to_advisor = "Advisor"

        [[agents]]
        name = "Concierge"
        description = "General questions and routing"
        prompt_template = "You are a helpful voice concierge. Keep answers short and spoken-friendly."
        greeting_template = "Hello! How can I help you today?"
        tool_names = ["handoff_to_agent"]

        [agents.outgoing_handoffs]
        transfer_to_advisor = "Advisor"

        [[agents]]
        name = "Advisor"
        description = "Detailed product and account advice"
        prompt_template = "You are a meticulous advisor. Keep answers short and spoken-friendly."
        greeting_template = "Hi, you're through to the advisor."
        return_greeting_template = "Welcome back to the advisor."
        "#,
    )
    .expect("built-in demo scenario is valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vg_domain::config::{Config, MemoryTransport};

    fn dev_state() -> AppState {
        let mut config = Config::default();
        config.memory.transport = MemoryTransport::Local;
        AppState::dev(Arc::new(config), default_scenario()).unwrap()
    }

    #[test]
    fn default_scenario_is_valid() {
        let s = default_scenario();
        assert_eq!(s.start_agent, "Concierge");
        assert!(s.agents.contains_key("Advisor"));
    }

    #[tokio::test]
    async fn push_scenario_to_unknown_session_is_false() {
        let state = dev_state();
        assert!(!state.push_scenario("nope", default_scenario(), None));
    }
}
