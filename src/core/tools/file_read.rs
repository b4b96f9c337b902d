use super::common::{
    check_on_disk_audited, parse_args, path_property, resolve_audited, unreadable_audited,
};
use super::file_list::list_audited;
use super::traits::{FailureKind, Tool, ToolResult};
use crate::core::session::SessionContext;
use crate::store::{AuditAction, AuditStatus, NewAuditEntry};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Deserialize)]
struct ReadArgs {
    path: String,
}

/// Read file contents with path sandboxing
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file. Directories return a listing; missing files return NOT_FOUND."
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
        let args: ReadArgs = match parse_args(args) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };
        let target = match resolve_audited(ctx, &args.path, AuditAction::Read).await? {
            Ok(target) => target,
            Err(denied) => return Ok(denied),
        };
        if let Err(denied) = check_on_disk_audited(ctx, &target, AuditAction::Read).await? {
            return Ok(denied);
        }

        let display = target.display_path();
        let metadata = match tokio::fs::metadata(&target.physical).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ctx.audit(NewAuditEntry::new(
                    &display,
                    AuditAction::Read,
                    AuditStatus::NotFound,
                ))
                .await?;
                return Ok(ToolResult::failed(
                    FailureKind::NotFound,
                    format!(
                        "File not found: {display}. Use list_files to see what exists; \
a new file can be created with propose_fix then write_fix."
                    ),
                ));
            }
            Err(e) => return unreadable_audited(ctx, &display, AuditAction::Read, &e).await,
        };

        // The model often confuses files and directories; answer with a listing instead.
        if metadata.is_dir() {
            let listing = match list_audited(ctx, &target, false).await? {
                Ok(listing) => listing,
                Err(denied) => return Ok(denied),
            };
            ctx.audit(
                NewAuditEntry::new(&display, AuditAction::Read, AuditStatus::Success)
                    .output("directory listing"),
            )
            .await?;
            let mut text = format!("DIRECTORY_LISTING [{display}]\n");
            for entry in &listing.entries {
                text.push_str(&entry.path);
                if entry.kind == "directory" {
                    text.push('/');
                }
                text.push('\n');
            }
            text.push_str(&listing.notes());
            return Ok(ToolResult::ok(text));
        }

        if metadata.len() > MAX_FILE_SIZE {
            return Ok(ToolResult::failed(
                FailureKind::AccessDenied,
                format!(
                    "File too large: {} bytes (limit: {MAX_FILE_SIZE} bytes)",
                    metadata.len()
                ),
            ));
        }

        let bytes = match tokio::fs::read(&target.physical).await {
            Ok(bytes) => bytes,
            Err(e) => return unreadable_audited(ctx, &display, AuditAction::Read, &e).await,
        };
        let contents = String::from_utf8_lossy(&bytes);
        ctx.audit(
            NewAuditEntry::new(&display, AuditAction::Read, AuditStatus::Success)
                .output(format!("{} bytes", bytes.len())),
        )
        .await?;

        Ok(ToolResult::ok(format!("FILE_CONTENTS [{display}]\n{contents}")))
    }
}
