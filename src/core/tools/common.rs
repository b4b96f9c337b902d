use serde::de::DeserializeOwned;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::warn;

use super::traits::{FailureKind, ToolResult};
use crate::core::session::SessionContext;
use crate::security::ResolvedPath;
use crate::security::approval::read_current;
use crate::store::{AuditAction, AuditStatus, NewAuditEntry};

pub(crate) fn path_property() -> serde_json::Value {
    json!({
        "type": "string",
        "description": "Path relative to the project root, or under the agent memory prefix"
    })
}

/// Deserialize tool arguments, turning schema mismatches into a `SCHEMA_ERROR` result.
pub(crate) fn parse_args<T: DeserializeOwned>(args: serde_json::Value) -> Result<T, ToolResult> {
    serde_json::from_value(args).map_err(|e| {
        ToolResult::failed(FailureKind::SchemaError, format!("Invalid arguments: {e}"))
    })
}

/// Resolve a path through the sandbox, auditing denials under `action`.
///
/// The outer `Err` is an audit-store failure; the inner one is the denial result for the model.
pub(crate) async fn resolve_audited(
    ctx: &SessionContext,
    raw_path: &str,
    action: AuditAction,
) -> anyhow::Result<Result<ResolvedPath, ToolResult>> {
    match ctx.policy.resolve(raw_path) {
        Ok(resolved) => Ok(Ok(resolved)),
        Err(denied) => {
            warn!(path = raw_path, reason = %denied, "path access denied");
            ctx.audit(
                NewAuditEntry::new(raw_path, action, AuditStatus::AccessDenied)
                    .output(denied.to_string()),
            )
            .await?;
            Ok(Err(ToolResult::failed(
                FailureKind::AccessDenied,
                denied.to_string(),
            )))
        }
    }
}

/// Re-check a resolved path against the filesystem (symlink escapes), auditing denials.
pub(crate) async fn check_on_disk_audited(
    ctx: &SessionContext,
    target: &ResolvedPath,
    action: AuditAction,
) -> anyhow::Result<Result<(), ToolResult>> {
    match ctx.policy.check_on_disk(target) {
        Ok(()) => Ok(Ok(())),
        Err(denied) => {
            warn!(path = %target.display_path(), reason = %denied, "on-disk check denied access");
            ctx.audit(
                NewAuditEntry::new(target.display_path(), action, AuditStatus::AccessDenied)
                    .output(denied.to_string()),
            )
            .await?;
            Ok(Err(ToolResult::failed(
                FailureKind::AccessDenied,
                denied.to_string(),
            )))
        }
    }
}

/// Current content of a file target, `None` when it does not exist yet.
///
/// Directories and unreadable files come back as a recoverable result for the model,
/// audited under `action`.
pub(crate) async fn read_current_audited(
    ctx: &SessionContext,
    target: &ResolvedPath,
    action: AuditAction,
) -> anyhow::Result<Result<Option<String>, ToolResult>> {
    let shown = target.display_path();
    match tokio::fs::metadata(&target.physical).await {
        Ok(meta) if meta.is_dir() => {
            let message = format!(
                "'{shown}' is a directory, not a file. Pass the path of a single file (use list_files to find it)."
            );
            ctx.audit(NewAuditEntry::new(&shown, action, AuditStatus::NotFound).output(&message))
                .await?;
            Ok(Err(ToolResult::failed(FailureKind::NotFound, message)))
        }
        Ok(_) => match read_current(&target.physical).await {
            Ok(current) => Ok(Ok(current)),
            Err(e) => Ok(Err(unreadable_audited(ctx, &shown, action, &e).await?)),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Ok(None)),
        Err(e) => Ok(Err(unreadable_audited(ctx, &shown, action, &e).await?)),
    }
}

/// Audit an I/O failure on an existing path and turn it into an `ACCESS_DENIED` result.
pub(crate) async fn unreadable_audited(
    ctx: &SessionContext,
    shown: &str,
    action: AuditAction,
    error: &std::io::Error,
) -> anyhow::Result<ToolResult> {
    warn!(path = shown, %error, "path unreadable");
    let message = format!("Cannot read '{shown}': {error}");
    ctx.audit(NewAuditEntry::new(shown, action, AuditStatus::AccessDenied).output(&message))
        .await?;
    Ok(ToolResult::failed(FailureKind::AccessDenied, message))
}

/// Hex SHA-256 of written content, recorded in the audit trail.
pub fn content_digest(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
