use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::core::session::SessionContext;

/// Recoverable failure classes reported back to the model as tool results.
///
/// Fatal errors are not listed here: they escape a tool as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AccessDenied,
    SchemaError,
    UnknownTool,
    ApprovalRequired,
    Rejected,
    ValidationFailed,
    CommandRejected,
    CommandFailed,
    NotFound,
    Skipped,
}

/// Result of a tool execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            failure: None,
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(message.into()),
            failure: Some(kind),
        }
    }

    /// Attach captured output (diagnostics, command output) to a result.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Text appended to the transcript as the tool message.
    pub fn render(&self) -> String {
        if self.success {
            return self.output.clone();
        }
        let kind = self
            .failure
            .map_or_else(|| "ERROR".to_string(), |k| k.to_string());
        let mut text = format!("{kind}: {}", self.error.as_deref().unwrap_or("failed"));
        if !self.output.is_empty() {
            text.push('\n');
            text.push_str(&self.output);
        }
        text
    }
}

/// Description of a tool for the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Core tool trait. Tools run strictly one at a time against the session context.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in LLM function calling)
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with already-parsed arguments.
    ///
    /// Recoverable problems come back as `Ok` with `success: false`. An `Err` is fatal
    /// for the session.
    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &mut SessionContext,
    ) -> anyhow::Result<ToolResult>;

    /// Get the full spec for LLM registration
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}
