use serde::{Deserialize, Serialize};

use crate::core::providers::{Message, Role};
use crate::core::tools::FailureKind;

/// What the kernel remembers about one dispatched tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool: String,
    /// The `path` argument, or `command` for run_command
    pub target: Option<String>,
    pub success: bool,
    pub failure: Option<FailureKind>,
    pub step: u32,
}

/// Ordered, append-only session history plus the dispatch records loop guards read.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    records: Vec<ToolCallRecord>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn record(&mut self, record: ToolCallRecord) {
        self.records.push(record);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn records(&self) -> &[ToolCallRecord] {
        &self.records
    }

    /// The last `n` dispatch records, oldest first.
    pub fn recent(&self, n: usize) -> &[ToolCallRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Text of the most recent assistant message that had any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
            .find(|c| !c.trim().is_empty())
    }

    /// Every assistant tool call has exactly one tool message answering it.
    pub fn calls_are_answered(&self) -> bool {
        let calls: Vec<&str> = self
            .messages
            .iter()
            .flat_map(|m| m.tool_calls.iter().map(|c| c.id.as_str()))
            .collect();
        let answers: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        calls.len() == answers.len() && calls.iter().all(|id| answers.contains(id))
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.records.clear();
    }
}
