use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use super::traits::{FailureKind, Tool, ToolResult, ToolSpec};
use crate::core::providers::ToolCall;
use crate::core::session::SessionContext;

/// The fixed table of tools the model may call.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(AsRef::as_ref)
    }

    /// Return sorted list of registered tool names.
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Specs for all registered tools, sorted by name so the schema sent to the model is stable.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|tool| tool.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Parse a call's raw arguments and run the named tool.
    ///
    /// Unknown tools and unparseable arguments come back as failed results. Only a tool's
    /// own `Err` propagates.
    pub async fn dispatch(
        &self,
        call: &ToolCall,
        ctx: &mut SessionContext,
    ) -> anyhow::Result<ToolResult> {
        let Some(tool) = self.tools.get(&call.name) else {
            return Ok(ToolResult::failed(
                FailureKind::UnknownTool,
                format!(
                    "Tool not found: {}. Available tools: {}",
                    call.name,
                    self.tool_names().join(", ")
                ),
            ));
        };

        let args = match parse_raw_arguments(&call.raw_arguments) {
            Ok(args) => args,
            Err(message) => {
                debug!(tool = %call.name, call_id = %call.id, "unparseable tool arguments");
                return Ok(ToolResult::failed(FailureKind::SchemaError, message));
            }
        };

        tool.execute(args, ctx).await
    }
}

/// Raw arguments must be a JSON object; blank text counts as `{}`.
pub fn parse_raw_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(format!(
            "Arguments must be a JSON object, got: {}",
            type_name(&other)
        )),
        Err(e) => Err(format!("Arguments are not valid JSON: {e}")),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
