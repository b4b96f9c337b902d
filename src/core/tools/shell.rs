use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::common::parse_args;
use super::traits::{FailureKind, Tool, ToolResult};
use crate::core::session::SessionContext;
use crate::store::{AuditAction, AuditStatus, NewAuditEntry};

/// Failure output kept as evidence for the next review.
const MAX_EVIDENCE_CHARS: usize = 4000;

#[derive(Deserialize)]
struct CommandArgs {
    command: String,
}

/// `run_command(command)`: allowlisted execution in the project root.
pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &str {
        "run_command"
    }

    fn description(&self) -> &str {
        "Run an allowlisted command (package install/list/test, the linter, ls) in the project root. No shell: pipes, redirects and chaining are refused."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "e.g. 'npm test' or 'npx jest tests/a.test.ts'"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &mut SessionContext,
    ) -> anyhow::Result<ToolResult> {
        let args: CommandArgs = match parse_args(args) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };
        let command = args.command.trim().to_string();

        let output = match ctx.policy.run_command(&command, ctx.limits).await {
            Ok(output) => output,
            Err(rejected) => {
                warn!(command = %command, reason = %rejected, "command rejected");
                ctx.audit(
                    NewAuditEntry::new(&command, AuditAction::Exec, AuditStatus::Rejected)
                        .output(rejected.to_string()),
                )
                .await?;
                return Ok(ToolResult::failed(
                    FailureKind::CommandRejected,
                    format!(
                        "{rejected}. Allowed prefixes: {}",
                        ctx.policy.allowed_commands().join(", ")
                    ),
                ));
            }
        };

        let combined = output.combined();
        let status = if output.success {
            AuditStatus::Success
        } else {
            AuditStatus::CommandError
        };
        info!(
            command = %command,
            exit_code = ?output.exit_code,
            timed_out = output.timed_out,
            "command finished"
        );
        ctx.audit(NewAuditEntry::new(&command, AuditAction::Exec, status).output(&combined))
            .await?;

        if output.success {
            return Ok(ToolResult::ok(format!("EXIT 0\n{combined}")));
        }

        let mut evidence = format!("`{command}` failed:\n{combined}");
        if evidence.len() > MAX_EVIDENCE_CHARS {
            evidence.truncate(evidence.floor_char_boundary(MAX_EVIDENCE_CHARS));
        }
        ctx.evidence = Some(evidence);

        let reason = if output.timed_out {
            "timed out".to_string()
        } else {
            match output.exit_code {
                Some(code) => format!("exited with status {code}"),
                None => "did not run to completion".to_string(),
            }
        };
        Ok(
            ToolResult::failed(FailureKind::CommandFailed, format!("`{command}` {reason}"))
                .with_output(combined),
        )
    }
}
