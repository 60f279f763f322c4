//! Handoff resolution and greeting selection.
//!
//! Two kinds of handoff tool exist: the generic `handoff_to_agent` (target
//! named in arguments) and legacy per-edge tools resolved through the
//! scenario's handoff map. Resolution validates the target against the
//! registry; the agent does not switch on failure.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use vg_domain::error::{Error, Result};

use crate::agent::AgentDescriptor;

/// The generic handoff tool name.
pub const GENERIC_HANDOFF_TOOL: &str = "handoff_to_agent";

/// How the switch is presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffType {
    /// The new agent greets explicitly.
    Announced,
    /// The new agent resumes silently.
    Discrete,
}

#[derive(Debug, Clone)]
pub struct HandoffResolution {
    pub target_agent: String,
    pub handoff_type: HandoffType,
    pub greet_on_switch: bool,
    pub reason: Option<String>,
    pub context: Option<String>,
}

pub struct HandoffService {
    handoff_map: HashMap<String, String>,
    agent_names: HashSet<String>,
    default_greet_on_switch: bool,
}

impl HandoffService {
    pub fn new(
        handoff_map: HashMap<String, String>,
        agent_names: HashSet<String>,
        default_greet_on_switch: bool,
    ) -> Self {
        Self {
            handoff_map,
            agent_names,
            default_greet_on_switch,
        }
    }

    /// Is this tool name a handoff (generic or legacy edge)?
    pub fn is_handoff(&self, tool_name: &str) -> bool {
        tool_name == GENERIC_HANDOFF_TOOL || self.handoff_map.contains_key(tool_name)
    }

    /// Target for a legacy handoff tool.
    pub fn target_for(&self, tool_name: &str) -> Option<&str> {
        self.handoff_map.get(tool_name).map(String::as_str)
    }

    /// Resolve a handoff tool call into a validated resolution.
    pub fn resolve(&self, tool_name: &str, args: &Value) -> Result<HandoffResolution> {
        let target = if tool_name == GENERIC_HANDOFF_TOOL {
            args.get("target_agent")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    Error::Handoff("handoff_to_agent called without target_agent".into())
                })?
                .to_owned()
        } else {
            self.target_for(tool_name)
                .ok_or_else(|| Error::Handoff(format!("tool '{tool_name}' not in handoff map")))?
                .to_owned()
        };

        if !self.agent_names.contains(&target) {
            return Err(Error::AgentNotFound(target));
        }

        // The tool call may demand a discrete switch regardless of the
        // scenario default.
        let greet_on_switch = args
            .get("discrete")
            .and_then(Value::as_bool)
            .map(|discrete| !discrete)
            .unwrap_or(self.default_greet_on_switch);

        Ok(HandoffResolution {
            target_agent: target,
            handoff_type: if greet_on_switch {
                HandoffType::Announced
            } else {
                HandoffType::Discrete
            },
            greet_on_switch,
            reason: args
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_owned),
            context: args
                .get("context")
                .and_then(Value::as_str)
                .map(str::to_owned),
        })
    }

    /// Pick the greeting for an agent activation.
    ///
    /// Order: explicit override in the system vars, silence in discrete
    /// mode, the return greeting for revisits, else the first-visit
    /// greeting.
    pub fn select_greeting(
        &self,
        agent: &AgentDescriptor,
        is_first_visit: bool,
        greet_on_switch: bool,
        system_vars: &serde_json::Map<String, Value>,
    ) -> Option<String> {
        if let Some(Value::String(explicit)) = system_vars.get("greeting") {
            if !explicit.is_empty() {
                return Some(explicit.clone());
            }
        }

        if !greet_on_switch {
            return None;
        }

        if !is_first_visit {
            if let Some(text) = agent.render_return_greeting(system_vars) {
                return Some(text);
            }
        }

        agent.render_greeting(system_vars)
    }
}
