use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::common::{
    check_on_disk_audited, parse_args, path_property, read_current_audited, resolve_audited,
};
use super::traits::{FailureKind, Tool, ToolResult};
use crate::core::session::SessionContext;
use crate::store::{AuditAction, AuditStatus, NewAuditEntry};

#[derive(Deserialize)]
pub(crate) struct CodeArgs {
    pub path: String,
    pub code: String,
}

/// `propose_fix(path, code)`: submit full new file content for review.
pub struct ProposeFixTool;

#[async_trait]
impl Tool for ProposeFixTool {
    fn name(&self) -> &str {
        "propose_fix"
    }

    fn description(&self) -> &str {
        "Submit the complete new content of a file for security review. An approval authorizes exactly one write_fix of the same path and code."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": path_property(),
                "code": {
                    "type": "string",
                    "description": "The full file content (not a diff or snippet)"
                }
            },
            "required": ["path", "code"]
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &mut SessionContext,
    ) -> anyhow::Result<ToolResult> {
        let args: CodeArgs = match parse_args(args) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };
        if args.code.trim().is_empty() {
            return Ok(ToolResult::failed(
                FailureKind::SchemaError,
                "code must contain the full file content",
            ));
        }

        let target = match resolve_audited(ctx, &args.path, AuditAction::Propose).await? {
            Ok(target) => target,
            Err(denied) => return Ok(denied),
        };
        if let Err(denied) = check_on_disk_audited(ctx, &target, AuditAction::Propose).await? {
            return Ok(denied);
        }
        let current = match read_current_audited(ctx, &target, AuditAction::Propose).await? {
            Ok(current) => current,
            Err(unreadable) => return Ok(unreadable),
        };

        let auditor = Arc::clone(&ctx.auditor);
        let evidence = ctx.evidence.clone();
        let verdict = ctx
            .approvals
            .propose_over(
                &target,
                &args.code,
                current,
                auditor.as_ref(),
                evidence.as_deref(),
                &ctx.checkpoints,
            )
            .await?;

        let display = target.display_path();
        let status = if verdict.is_approved() {
            AuditStatus::Success
        } else {
            AuditStatus::Rejected
        };
        ctx.audit(
            NewAuditEntry::new(&display, AuditAction::Propose, status)
                .output(verdict.rationale()),
        )
        .await?;

        Ok(if verdict.is_approved() {
            ToolResult::ok(format!(
                "APPROVED [{display}]: {}\nCheckpoint saved. Now call write_fix with this exact path and code.",
                verdict.rationale()
            ))
        } else {
            ToolResult::failed(
                FailureKind::Rejected,
                format!("[{display}] {}", verdict.rationale()),
            )
        })
    }
}
