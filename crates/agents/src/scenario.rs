//! Scenario: a named set of agents, handoff edges, and a start agent.
//!
//! Scenarios load from TOML at startup and can be hot-swapped mid-session
//! via `Orchestrator::update_scenario`.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use vg_domain::error::{Error, Result};

use crate::agent::AgentDescriptor;

#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub agents: HashMap<String, Arc<AgentDescriptor>>,
    /// Legacy handoff tool name → target agent.
    pub handoff_map: HashMap<String, String>,
    pub start_agent: String,
    /// Whether the new agent greets on switch (announced vs discrete).
    pub greet_on_switch: bool,
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    name: String,
    start_agent: String,
    #[serde(default = "d_true")]
    greet_on_switch: bool,
    #[serde(default)]
    handoff_map: HashMap<String, String>,
    #[serde(default)]
    agents: Vec<AgentDescriptor>,
}

fn d_true() -> bool {
    true
}

impl Scenario {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: ScenarioFile =
            toml::from_str(raw).map_err(|e| Error::Config(format!("scenario: {e}")))?;
        Self::from_parts(
            file.name,
            file.agents,
            file.handoff_map,
            file.start_agent,
            file.greet_on_switch,
        )
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_parts(
        name: String,
        agents: Vec<AgentDescriptor>,
        handoff_map: HashMap<String, String>,
        start_agent: String,
        greet_on_switch: bool,
    ) -> Result<Self> {
        let agents: HashMap<String, Arc<AgentDescriptor>> = agents
            .into_iter()
            .map(|a| (a.name.clone(), Arc::new(a)))
            .collect();

        if !agents.contains_key(&start_agent) {
            return Err(Error::Config(format!(
                "scenario '{name}': start agent '{start_agent}' not defined"
            )));
        }
        for (tool, target) in &handoff_map {
            if !agents.contains_key(target) {
                return Err(Error::Config(format!(
                    "scenario '{name}': handoff '{tool}' targets unknown agent '{target}'"
                )));
            }
        }

        Ok(Self {
            name,
            agents,
            handoff_map,
            start_agent,
            greet_on_switch,
        })
    }

    pub fn agent_names(&self) -> HashSet<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<AgentDescriptor>> {
        self.agents.get(name).cloned()
    }

    /// System-prompt addendum describing where this agent may hand off to.
    /// Returns `None` when the agent has no outgoing edges.
    pub fn build_handoff_instructions(&self, agent_name: &str) -> Option<String> {
        let agent = self.agents.get(agent_name)?;
        if agent.outgoing_handoffs.is_empty() {
            return None;
        }

        let mut targets: Vec<(&String, &String)> = agent.outgoing_handoffs.iter().collect();
        targets.sort();

        let mut out = String::from(
            "You can transfer this conversation to another specialist with the \
             handoff_to_agent tool. Available targets:\n",
        );
        for (_, target) in targets {
            let desc = self
                .agents
                .get(target)
                .map(|a| a.description.as_str())
                .unwrap_or("");
            out.push_str(&format!("- {target}: {desc}\n"));
        }
        out.push_str("Only transfer when the user's request is outside your scope.");
        Some(out)
    }
}
