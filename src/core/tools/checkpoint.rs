use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::common::{
    check_on_disk_audited, parse_args, path_property, read_current_audited, resolve_audited,
};
use super::traits::{FailureKind, Tool, ToolResult};
use crate::core::session::SessionContext;
use crate::store::{AuditAction, AuditStatus, CheckpointOrigin, NewAuditEntry};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum CheckpointAction {
    Save,
    Load,
}

#[derive(Deserialize)]
struct CheckpointArgs {
    action: CheckpointAction,
    path: String,
    #[serde(default)]
    content: Option<String>,
}

/// `checkpoint_manager(action, path, content?)`
pub struct CheckpointTool;

#[async_trait]
impl Tool for CheckpointTool {
    fn name(&self) -> &str {
        "checkpoint_manager"
    }

    fn description(&self) -> &str {
        "Save or load the last known-good content of a file. Approved proposals are checkpointed automatically; 'load' returns it so you can propose it again."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["save", "load"]
                },
                "path": path_property(),
                "content": {
                    "type": "string",
                    "description": "Content to save; defaults to the file currently on disk"
                }
            },
            "required": ["action", "path"]
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &mut SessionContext,
    ) -> anyhow::Result<ToolResult> {
        let args: CheckpointArgs = match parse_args(args) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };
        let target = match resolve_audited(ctx, &args.path, AuditAction::Checkpoint).await? {
            Ok(target) => target,
            Err(denied) => return Ok(denied),
        };
        let display = target.display_path();

        match args.action {
            CheckpointAction::Save => {
                let content = match args.content {
                    Some(content) => content,
                    None => {
                        if let Err(denied) =
                            check_on_disk_audited(ctx, &target, AuditAction::Checkpoint).await?
                        {
                            return Ok(denied);
                        }
                        match read_current_audited(ctx, &target, AuditAction::Checkpoint).await? {
                            Ok(Some(text)) => text,
                            Ok(None) => {
                                return Ok(ToolResult::failed(
                                    FailureKind::NotFound,
                                    format!("Nothing to checkpoint: {display} does not exist"),
                                ));
                            }
                            Err(unreadable) => return Ok(unreadable),
                        }
                    }
                };
                ctx.checkpoints
                    .save_as(&display, &content, CheckpointOrigin::Agent)
                    .await?;
                ctx.audit(
                    NewAuditEntry::new(&display, AuditAction::Checkpoint, AuditStatus::Success)
                        .output(format!("saved {} bytes", content.len())),
                )
                .await?;
                Ok(ToolResult::ok(format!(
                    "CHECKPOINT_SAVED [{display}]: {} bytes",
                    content.len()
                )))
            }
            CheckpointAction::Load => match ctx.checkpoints.get(&display).await? {
                Some(checkpoint) => {
                    ctx.audit(
                        NewAuditEntry::new(&display, AuditAction::Checkpoint, AuditStatus::Success)
                            .output("loaded"),
                    )
                    .await?;
                    Ok(ToolResult::ok(format!(
                        "CHECKPOINT [{display}] {} saved {}\n{}",
                        checkpoint.origin, checkpoint.saved_at, checkpoint.content
                    )))
                }
                None => {
                    ctx.audit(NewAuditEntry::new(
                        &display,
                        AuditAction::Checkpoint,
                        AuditStatus::NotFound,
                    ))
                    .await?;
                    Ok(ToolResult::failed(
                        FailureKind::NotFound,
                        format!("No checkpoint for {display}"),
                    ))
                }
            },
        }
    }
}
