use std::str::FromStr;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::common::parse_args;
use super::traits::{FailureKind, Tool, ToolResult};
use crate::core::session::SessionContext;
use crate::store::AuditStatus;

const DEFAULT_LIMIT: u32 = 10;
const MAX_LIMIT: u32 = 100;
const OUTPUT_PREVIEW_CHARS: usize = 300;

#[derive(Deserialize)]
struct AuditArgs {
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    status: Option<String>,
}

/// `get_audit_logs(limit?, status?)`: most recent audit entries, newest first.
pub struct AuditLogsTool;

#[async_trait]
impl Tool for AuditLogsTool {
    fn name(&self) -> &str {
        "get_audit_logs"
    }

    fn description(&self) -> &str {
        "List the most recent audit entries, newest first, optionally filtered by status."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_LIMIT,
                    "description": "Entries to return (default 10)"
                },
                "status": {
                    "type": "string",
                    "enum": [
                        "success", "lint_error", "validation_failed", "command_error",
                        "access_denied", "rejected", "not_found"
                    ]
                }
            }
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &mut SessionContext,
    ) -> anyhow::Result<ToolResult> {
        let args: AuditArgs = match parse_args(args) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };
        let status = match args.status.as_deref().map(AuditStatus::from_str).transpose() {
            Ok(status) => status,
            Err(_) => {
                return Ok(ToolResult::failed(
                    FailureKind::SchemaError,
                    format!("Unknown status filter: {}", args.status.unwrap_or_default()),
                ));
            }
        };
        let limit = args.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let entries = ctx.audit.query(limit, status).await?;
        if entries.is_empty() {
            return Ok(ToolResult::ok("No audit entries."));
        }

        let mut text = String::new();
        for entry in entries {
            let mut preview = entry.output.replace('\n', " ");
            if preview.len() > OUTPUT_PREVIEW_CHARS {
                preview.truncate(preview.floor_char_boundary(OUTPUT_PREVIEW_CHARS));
                preview.push_str("...");
            }
            text.push_str(&format!(
                "#{} {} {} {} [{}] {}\n",
                entry.id, entry.timestamp, entry.action, entry.status, entry.path, preview
            ));
        }
        Ok(ToolResult::ok(text))
    }
}
