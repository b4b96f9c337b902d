use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::common::{parse_args, path_property};
use super::traits::{FailureKind, Tool, ToolResult};
use crate::core::session::SessionContext;
use crate::security::ApprovalState;
use crate::store::{AuditAction, AuditEntry, AuditStatus};

const RECENT_ENTRIES: u32 = 5;
const RECENT_GLOBAL_ENTRIES: u32 = 50;

#[derive(Deserialize)]
struct StatusArgs {
    path: String,
}

/// `get_status(path)`: approval state, recent audit history, and the next step.
pub struct StatusTool;

#[async_trait]
impl Tool for StatusTool {
    fn name(&self) -> &str {
        "get_status"
    }

    fn description(&self) -> &str {
        "Show the approval state and recent audit history of a path, with the recommended next step."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": path_property()
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &mut SessionContext,
    ) -> anyhow::Result<ToolResult> {
        let args: StatusArgs = match parse_args(args) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };
        let target = match ctx.policy.resolve(&args.path) {
            Ok(target) => target,
            Err(denied) => {
                return Ok(ToolResult::failed(
                    FailureKind::AccessDenied,
                    denied.to_string(),
                ));
            }
        };
        let display = target.display_path();
        let state = ctx.approvals.state(&target.physical);
        let history = ctx.audit.query_path(&display, RECENT_ENTRIES).await?;

        let mut text = format!(
            "STATUS [{display}]\napproval: {}\n",
            state.map_or_else(|| "none".to_string(), |s| s.to_string())
        );
        if let Some(rationale) = ctx
            .approvals
            .proposal(&target.physical)
            .and_then(|p| p.rationale.as_deref())
        {
            text.push_str(&format!("rationale: {rationale}\n"));
        }
        text.push_str("recent activity:\n");
        if history.is_empty() {
            text.push_str("  (none)\n");
        }
        for entry in &history {
            text.push_str(&format!(
                "  #{} {} {} {}\n",
                entry.id, entry.timestamp, entry.action, entry.status
            ));
        }
        // Commands are audited under their own text, so look at the global trail.
        let last_write = history
            .iter()
            .find(|e| matches!(e.action, AuditAction::WriteSrc | AuditAction::WriteTest));
        let tested_since_write = match last_write {
            Some(write) => ctx
                .audit
                .query(RECENT_GLOBAL_ENTRIES, Some(AuditStatus::Success))
                .await?
                .iter()
                .any(|e| e.action == AuditAction::Exec && e.id > write.id),
            None => false,
        };
        text.push_str(&format!(
            "next: {}\n",
            recommend(state, last_write, tested_since_write, &ctx.termination_signal)
        ));
        Ok(ToolResult::ok(text))
    }
}

/// Walk the propose -> write -> lint -> test -> complete ladder.
fn recommend(
    state: Option<ApprovalState>,
    last_write: Option<&AuditEntry>,
    tested_since_write: bool,
    signal: &str,
) -> String {
    match state {
        None | Some(ApprovalState::Proposed) => {
            "call propose_fix with the full corrected file content".into()
        }
        Some(ApprovalState::Rejected) => {
            "address the auditor's rationale and call propose_fix again".into()
        }
        Some(ApprovalState::Approved) => {
            "call write_fix with the exact approved path and code".into()
        }
        Some(ApprovalState::Consumed) => match last_write.map(|e| e.status) {
            Some(AuditStatus::LintError) => {
                "fix the lint diagnostics and call propose_fix with the corrected file".into()
            }
            Some(AuditStatus::ValidationFailed) => {
                "fix the failing tests and call propose_fix again".into()
            }
            _ if tested_since_write => {
                format!("reply with {signal} when the vulnerability is fixed")
            }
            _ => "verify with run_command (e.g. npm test)".into(),
        },
    }
}
