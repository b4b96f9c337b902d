use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::common::parse_args;
use super::traits::{Tool, ToolResult};
use crate::core::session::SessionContext;

pub const NO_KNOWLEDGE_BASE: &str = "No knowledge base configured.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub code: String,
}

/// Operator-supplied remediation notes keyed by topic (`sql_injection`, `xss`, ...).
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    entries: BTreeMap<String, KnowledgeEntry>,
    configured: bool,
}

impl KnowledgeBase {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<String, KnowledgeEntry>) -> Self {
        Self {
            entries,
            configured: true,
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read knowledge base {}", path.display()))?;
        let entries: BTreeMap<String, KnowledgeEntry> = serde_json::from_str(&raw)
            .with_context(|| format!("parse knowledge base {}", path.display()))?;
        Ok(Self::from_entries(entries))
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry whose key occurs in the query, or that contains the query.
    pub fn lookup(&self, query: &str) -> Option<(&str, &KnowledgeEntry)> {
        let needle = normalize(query);
        if needle.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|(key, _)| {
                let key = normalize(key);
                needle.contains(&key) || key.contains(&needle)
            })
            .map(|(k, v)| (k.as_str(), v))
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase().replace([' ', '-'], "_")
}

#[derive(Deserialize)]
struct KnowledgeArgs {
    query: String,
}

/// `get_knowledge(query)`
pub struct KnowledgeTool;

#[async_trait]
impl Tool for KnowledgeTool {
    fn name(&self) -> &str {
        "get_knowledge"
    }

    fn description(&self) -> &str {
        "Look up remediation guidance for a vulnerability class (e.g. 'sql injection', 'xss')."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Vulnerability class or short description"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &mut SessionContext,
    ) -> anyhow::Result<ToolResult> {
        let args: KnowledgeArgs = match parse_args(args) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        if !ctx.knowledge.is_configured() {
            return Ok(ToolResult::ok(NO_KNOWLEDGE_BASE));
        }

        Ok(match ctx.knowledge.lookup(&args.query) {
            Some((key, entry)) => {
                let mut text = format!("KNOWLEDGE [{key}] {}\n\n{}", entry.title, entry.description);
                if !entry.code.is_empty() {
                    text.push_str("\n\nExample:\n");
                    text.push_str(&entry.code);
                }
                ToolResult::ok(text)
            }
            None => ToolResult::ok(format!(
                "No knowledge entry matches '{}'. Proceed with general secure-coding practice.",
                args.query
            )),
        })
    }
}
