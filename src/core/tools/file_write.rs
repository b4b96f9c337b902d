use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use super::common::{
    check_on_disk_audited, content_digest, parse_args, path_property, read_current_audited,
    resolve_audited,
};
use super::propose_fix::CodeArgs;
use super::traits::{FailureKind, Tool, ToolResult};
use crate::core::session::SessionContext;
use crate::security::ApprovalState;
use crate::security::ResolvedPath;
use crate::security::policy::PROJECT_ROOT_NAME;
use crate::store::{AuditAction, AuditStatus, NewAuditEntry};

/// `write_fix(path, code)`: write previously approved content, then verify it.
pub struct WriteFixTool;

#[async_trait]
impl Tool for WriteFixTool {
    fn name(&self) -> &str {
        "write_fix"
    }

    fn description(&self) -> &str {
        "Write the approved content to the file, then run lint (and tests when configured). Requires a prior approved propose_fix for this exact path."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": path_property(),
                "code": {
                    "type": "string",
                    "description": "The full file content exactly as approved"
                }
            },
            "required": ["path", "code"]
        })
    }

    #[allow(clippy::too_many_lines)]
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

        let target = match resolve_audited(ctx, &args.path, AuditAction::WriteSrc).await? {
            Ok(target) => target,
            Err(denied) => return Ok(denied),
        };
        let action = if target.is_test_file() {
            AuditAction::WriteTest
        } else {
            AuditAction::WriteSrc
        };
        let shown = target.display_path();

        if !ctx.approvals.authorize_write(&target.physical) {
            let message = approval_required_message(ctx, &target);
            warn!(path = %shown, "write attempted without approval");
            ctx.audit(
                NewAuditEntry::new(&shown, action, AuditStatus::Rejected).output(&message),
            )
            .await?;
            return Ok(ToolResult::failed(FailureKind::ApprovalRequired, message));
        }

        if ctx.write_guard.binds_content()
            && ctx.approvals.approved_content(&target.physical) != Some(args.code.as_str())
        {
            let message = format!(
                "Content for '{shown}' differs from the approved proposal. \
Call write_fix with the exact approved code, or propose_fix again with the new content."
            );
            ctx.audit(
                NewAuditEntry::new(&shown, action, AuditStatus::Rejected).output(&message),
            )
            .await?;
            return Ok(ToolResult::failed(FailureKind::ApprovalRequired, message));
        }

        if let Err(denied) = check_on_disk_audited(ctx, &target, action).await? {
            return Ok(denied);
        }

        let original = match read_current_audited(ctx, &target, action).await? {
            Ok(original) => original,
            Err(unreadable) => return Ok(unreadable),
        };
        if let Err(violation) = ctx.write_guard.check(original.as_deref(), &args.code) {
            let message = format!("Write to '{shown}' refused: {violation}");
            ctx.audit(
                NewAuditEntry::new(&shown, action, AuditStatus::ValidationFailed)
                    .output(&message),
            )
            .await?;
            return Ok(ToolResult::failed(FailureKind::ValidationFailed, message));
        }

        if let Err(e) = write_file(&target.physical, &args.code).await {
            let message = format!("Cannot write '{shown}': {e}");
            warn!(path = %shown, error = %e, "approved write failed");
            ctx.audit(
                NewAuditEntry::new(&shown, action, AuditStatus::AccessDenied).output(&message),
            )
            .await?;
            return Ok(ToolResult::failed(FailureKind::AccessDenied, message));
        }
        ctx.approvals.consume(&target.physical);
        let digest = content_digest(&args.code);
        info!(path = %shown, bytes = args.code.len(), "approved content written");

        if target.root != PROJECT_ROOT_NAME {
            ctx.audit(
                NewAuditEntry::new(&shown, action, AuditStatus::Success)
                    .digest(&digest)
                    .output(format!("{} bytes written", args.code.len())),
            )
            .await?;
            return Ok(ToolResult::ok(format!(
                "WRITE_SUCCESS [{shown}]: {} bytes written.",
                args.code.len()
            )));
        }

        let project_root = ctx.policy.project_root().to_path_buf();
        let report = ctx.linter.lint(&target.physical, &project_root).await?;
        if report.is_failure() {
            let diagnostics = report.render();
            ctx.audit(
                NewAuditEntry::new(&shown, action, AuditStatus::LintError)
                    .digest(&digest)
                    .output(&diagnostics),
            )
            .await?;
            ctx.evidence = Some(format!("Lint errors in {shown}:\n{diagnostics}"));
            return Ok(ToolResult::failed(
                FailureKind::ValidationFailed,
                format!(
                    "'{shown}' was written but lint reported problems. The file stays as written; \
propose a corrected version (checkpoint_manager load restores the approved one)."
                ),
            )
            .with_output(diagnostics));
        }

        let mut summary = format!(
            "WRITE_SUCCESS [{shown}]: {} bytes written. Lint: {}.",
            args.code.len(),
            report.render()
        );

        if let Some(command) = ctx.post_write_test.clone() {
            match run_post_write_test(ctx, &command).await? {
                Ok(output) => {
                    summary.push_str(" Tests passed.\n");
                    summary.push_str(&output);
                }
                Err(output) => {
                    ctx.audit(
                        NewAuditEntry::new(&shown, action, AuditStatus::ValidationFailed)
                            .digest(&digest)
                            .output(&output),
                    )
                    .await?;
                    ctx.evidence = Some(format!("Tests failed after writing {shown}:\n{output}"));
                    return Ok(ToolResult::failed(
                        FailureKind::ValidationFailed,
                        format!("'{shown}' was written and linted clean, but `{command}` failed."),
                    )
                    .with_output(output));
                }
            }
        }

        ctx.audit(
            NewAuditEntry::new(&shown, action, AuditStatus::Success)
                .digest(&digest)
                .output(format!("{} bytes written", args.code.len())),
        )
        .await?;
        ctx.evidence = None;
        Ok(ToolResult::ok(summary))
    }
}

async fn write_file(path: &std::path::Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}

/// Run the configured test command through the gate. Inner `Err` carries failure output.
async fn run_post_write_test(
    ctx: &SessionContext,
    command: &str,
) -> anyhow::Result<Result<String, String>> {
    match ctx.policy.run_command(command, ctx.limits).await {
        Ok(output) => {
            let status = if output.success {
                AuditStatus::Success
            } else {
                AuditStatus::CommandError
            };
            ctx.audit(
                NewAuditEntry::new(command, AuditAction::Exec, status).output(output.combined()),
            )
            .await?;
            Ok(if output.success {
                Ok(output.combined())
            } else {
                Err(output.combined())
            })
        }
        Err(rejected) => {
            ctx.audit(
                NewAuditEntry::new(command, AuditAction::Exec, AuditStatus::Rejected)
                    .output(rejected.to_string()),
            )
            .await?;
            Ok(Err(format!("post-write test command rejected: {rejected}")))
        }
    }
}

fn approval_required_message(ctx: &SessionContext, target: &ResolvedPath) -> String {
    let shown = target.display_path();
    let reason = match ctx.approvals.state(&target.physical) {
        Some(ApprovalState::Consumed) => "its last approval was already used by a write".into(),
        Some(ApprovalState::Rejected) => "its latest proposal was rejected".into(),
        Some(ApprovalState::Proposed) => "its latest proposal has no verdict".into(),
        Some(ApprovalState::Approved) | None => match ctx.approvals.latest() {
            Some(latest) if latest.path != shown => format!(
                "there is no proposal for it (the latest proposal was for '{}')",
                latest.path
            ),
            _ => "there is no proposal for it".into(),
        },
    };
    format!(
        "No approved proposal for '{shown}': {reason}. \
Call propose_fix with this exact path and the full content first."
    )
}
