//! Tool registry and the `execute(name, args)` contract.
//!
//! Tools are read-only after initialization. A tool result is "handoff-like"
//! iff it includes `handoff: true`; it may also carry `slots` (merged into
//! the session) and `should_interrupt_playback` (honored only for tools
//! registered as transfer tools).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use vg_domain::error::{Error, Result};
use vg_domain::message::ToolDefinition;

use crate::agent::AgentDescriptor;
use crate::handoff::GENERIC_HANDOFF_TOOL;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the tool's parameters.
    fn parameters(&self) -> Value;
    /// Transfer tools (call-center routing) may interrupt playback.
    fn is_transfer(&self) -> bool {
        false
    }
    async fn execute(&self, args: Value) -> Result<Value>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_owned(), tool);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn is_transfer(&self, name: &str) -> bool {
        self.tools.get(name).map(|t| t.is_transfer()).unwrap_or(false)
    }

    /// Execute a tool by name. Execution failures are captured into an
    /// `{error, tool_name}` result by the caller, not raised across lanes.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value> {
        let tool = self.tools.get(name).ok_or_else(|| Error::Tool {
            tool: name.to_owned(),
            message: "not registered".into(),
        })?;
        tool.execute(args).await
    }

    /// Definitions for the LLM from an agent's tool list.
    ///
    /// Explicit handoff tool functions are filtered in favor of a single
    /// generic `handoff_to_agent` when `generic_handoffs` is enabled or the
    /// agent has outgoing edges.
    pub fn definitions_for_agent(
        &self,
        agent: &AgentDescriptor,
        handoff_map: &HashMap<String, String>,
        generic_handoffs: bool,
    ) -> Vec<ToolDefinition> {
        let use_generic = generic_handoffs || agent.has_outgoing_handoffs();

        let mut defs: Vec<ToolDefinition> = Vec::new();
        for name in &agent.tool_names {
            let is_handoff_tool =
                name.as_str() == GENERIC_HANDOFF_TOOL || handoff_map.contains_key(name.as_str());
            if is_handoff_tool && use_generic {
                continue;
            }
            match self.tools.get(name) {
                Some(tool) => defs.push(ToolDefinition {
                    name: tool.name().to_owned(),
                    description: tool.description().to_owned(),
                    parameters: tool.parameters(),
                }),
                None => {
                    tracing::warn!(tool = %name, agent = %agent.name, "agent names unregistered tool")
                }
            }
        }

        if use_generic {
            let mut targets: Vec<String> = agent.outgoing_handoffs.values().cloned().collect();
            targets.sort();
            targets.dedup();
            defs.push(generic_handoff_definition(&targets));
        }

        defs
    }
}

/// Definition of the generic handoff tool, listing the reachable targets.
pub fn generic_handoff_definition(targets: &[String]) -> ToolDefinition {
    let target_schema = if targets.is_empty() {
        serde_json::json!({"type": "string"})
    } else {
        serde_json::json!({"type": "string", "enum": targets})
    };
    ToolDefinition {
        name: GENERIC_HANDOFF_TOOL.to_owned(),
        description: "Transfer the conversation to another agent. Use only when the \
                      user's request is outside your scope."
            .to_owned(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "target_agent": target_schema,
                "reason": {"type": "string"},
                "context": {"type": "string", "description": "What the next agent should know."}
            },
            "required": ["target_agent"]
        }),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Typed view over a tool's result mapping.
pub struct ToolOutcome<'a>(pub &'a Value);

impl ToolOutcome<'_> {
    /// A result is handoff-like iff it includes `handoff: true`.
    pub fn is_handoff(&self) -> bool {
        self.0
            .get("handoff")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Explicit target that preempts the handoff map.
    pub fn target_agent(&self) -> Option<&str> {
        self.0.get("target_agent").and_then(Value::as_str)
    }

    pub fn slots(&self) -> Option<&serde_json::Map<String, Value>> {
        self.0.get("slots").and_then(Value::as_object)
    }

    pub fn should_interrupt_playback(&self) -> bool {
        self.0
            .get("should_interrupt_playback")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the arguments back."
        }
        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, args: Value) -> Result<Value> {
            Ok(json!({"echoed": args}))
        }
    }

    struct FailingTool;

    #[async_trait::async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails."
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: Value) -> Result<Value> {
            Err(Error::Tool {
                tool: "broken".into(),
                message: "boom".into(),
            })
        }
    }

    fn agent_with_tools(tools: &[&str], handoffs: &[(&str, &str)]) -> AgentDescriptor {
        let mut outgoing = HashMap::new();
        for (k, v) in handoffs {
            outgoing.insert(k.to_string(), v.to_string());
        }
        serde_json::from_value(json!({
            "name": "Concierge",
            "prompt_template": "p",
            "tool_names": tools,
            "outgoing_handoffs": serde_json::to_value(outgoing).unwrap(),
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn execute_runs_registered_tool() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let out = reg.execute("echo", json!({"text": "hi"})).await.unwrap();
        assert_eq!(out["echoed"]["text"], "hi");
    }

    #[tokio::test]
    async fn execute_unknown_tool_errors() {
        let reg = ToolRegistry::new();
        assert!(reg.execute("nope", json!({})).await.is_err());
    }

    #[tokio::test]
    async fn execute_propagates_tool_failure() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(FailingTool));
        assert!(reg.execute("broken", json!({})).await.is_err());
    }

    #[test]
    fn definitions_replace_handoff_edges_with_generic() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let agent = agent_with_tools(
            &["echo", "transfer_to_advisor"],
            &[("transfer_to_advisor", "Advisor")],
        );
        let mut map = HashMap::new();
        map.insert("transfer_to_advisor".to_string(), "Advisor".to_string());

        let defs = reg.definitions_for_agent(&agent, &map, false);
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["echo", GENERIC_HANDOFF_TOOL]);

        // Targets show up in the enum schema.
        let generic = defs.last().unwrap();
        assert_eq!(
            generic.parameters["properties"]["target_agent"]["enum"],
            json!(["Advisor"])
        );
    }

    #[test]
    fn definitions_without_handoffs_have_no_generic() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        let agent = agent_with_tools(&["echo"], &[]);
        let defs = reg.definitions_for_agent(&agent, &HashMap::new(), false);
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }

    #[test]
    fn outcome_classification() {
        let handoff = json!({"handoff": true, "target_agent": "Advisor"});
        assert!(ToolOutcome(&handoff).is_handoff());
        assert_eq!(ToolOutcome(&handoff).target_agent(), Some("Advisor"));

        let plain = json!({"slots": {"customer_name": "Jane"}, "summary": "ok"});
        let outcome = ToolOutcome(&plain);
        assert!(!outcome.is_handoff());
        assert_eq!(outcome.slots().unwrap()["customer_name"], json!("Jane"));
        assert!(!outcome.should_interrupt_playback());
    }
}
