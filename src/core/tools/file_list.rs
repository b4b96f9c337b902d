use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use super::common::{
    check_on_disk_audited, parse_args, path_property, resolve_audited, unreadable_audited,
};
use super::traits::{FailureKind, Tool, ToolResult};
use crate::core::session::SessionContext;
use crate::security::ResolvedPath;
use crate::store::{AuditAction, AuditStatus, NewAuditEntry};

const MAX_ENTRIES: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub path: String,
}

/// Result of walking a directory.
#[derive(Debug, Default)]
pub(crate) struct Listing {
    pub entries: Vec<DirEntry>,
    /// Cut at [`MAX_ENTRIES`].
    pub truncated: bool,
    /// Directories whose contents could not be read, skipped.
    pub unreadable: Vec<String>,
}

impl Listing {
    /// Footer lines telling the model what the listing leaves out.
    pub(crate) fn notes(&self) -> String {
        let mut notes = String::new();
        if self.truncated {
            notes.push_str(&format!(
                "\n(listing truncated at {MAX_ENTRIES} entries; list a subdirectory)"
            ));
        }
        if !self.unreadable.is_empty() {
            notes.push_str(&format!(
                "\n(could not read: {})",
                self.unreadable.join(", ")
            ));
        }
        notes
    }
}

/// Enumerate a directory, skipping the ignore-set.
///
/// Recursive walks re-resolve every child through the sandbox and never descend into
/// symlinks. Directories that cannot be read are skipped and reported in
/// [`Listing::unreadable`].
pub(crate) async fn list_directory(
    ctx: &SessionContext,
    dir: &ResolvedPath,
    recursive: bool,
) -> Listing {
    let mut listing = Listing::default();
    let mut pending = vec![dir.display_path()];

    while let Some(virtual_dir) = pending.pop() {
        let Ok(resolved) = ctx.policy.resolve(&virtual_dir) else {
            continue;
        };
        let mut reader = match tokio::fs::read_dir(&resolved.physical).await {
            Ok(reader) => reader,
            Err(e) => {
                warn!(path = %virtual_dir, error = %e, "skipping unreadable directory");
                listing.unreadable.push(virtual_dir);
                continue;
            }
        };
        let mut children = Vec::new();
        loop {
            let child = match reader.next_entry().await {
                Ok(Some(child)) => child,
                Ok(None) => break,
                Err(e) => {
                    warn!(path = %virtual_dir, error = %e, "directory read interrupted");
                    listing.unreadable.push(virtual_dir.clone());
                    break;
                }
            };
            let name = child.file_name().to_string_lossy().into_owned();
            if ctx.ignored_entries.iter().any(|ignored| *ignored == name) {
                continue;
            }
            match child.file_type().await {
                Ok(file_type) => children.push((name, file_type)),
                Err(e) => warn!(path = %virtual_dir, entry = %name, error = %e, "skipping entry"),
            }
        }
        children.sort_by(|a, b| a.0.cmp(&b.0));

        for (name, file_type) in children {
            let child_virtual = if virtual_dir == "." {
                name.clone()
            } else {
                format!("{virtual_dir}/{name}")
            };
            // Restricted children are unreachable, so they are not listed either.
            let Ok(child) = ctx.policy.resolve(&child_virtual) else {
                continue;
            };
            let kind = if file_type.is_symlink() {
                "symlink"
            } else if file_type.is_dir() {
                "directory"
            } else {
                "file"
            };
            if recursive && kind == "directory" {
                pending.push(child.display_path());
            }
            listing.entries.push(DirEntry {
                name,
                kind,
                path: child.display_path(),
            });
            if listing.entries.len() >= MAX_ENTRIES {
                listing.truncated = true;
                return listing;
            }
        }
    }

    listing.entries.sort_by(|a, b| a.path.cmp(&b.path));
    listing
}

/// [`list_directory`], with an unreadable `dir` itself audited and returned as `ACCESS_DENIED`.
pub(crate) async fn list_audited(
    ctx: &SessionContext,
    dir: &ResolvedPath,
    recursive: bool,
) -> anyhow::Result<Result<Listing, ToolResult>> {
    let shown = dir.display_path();
    let listing = list_directory(ctx, dir, recursive).await;
    if listing.unreadable.first() != Some(&shown) {
        return Ok(Ok(listing));
    }
    let message = format!("Cannot read directory '{shown}'");
    ctx.audit(
        NewAuditEntry::new(&shown, AuditAction::Read, AuditStatus::AccessDenied)
            .output(&message),
    )
    .await?;
    Ok(Err(ToolResult::failed(FailureKind::AccessDenied, message)))
}

#[derive(Deserialize)]
struct ListArgs {
    #[serde(default = "default_path")]
    path: String,
    #[serde(default)]
    recursive: bool,
}

fn default_path() -> String {
    ".".into()
}

/// `list_files(path, recursive?)`
pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List directory entries as JSON [{name, type, path}]. Dependency caches, VCS metadata and build output are omitted."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": path_property(),
                "recursive": {
                    "type": "boolean",
                    "description": "Walk subdirectories too (default false)"
                }
            }
        })
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        ctx: &mut SessionContext,
    ) -> anyhow::Result<ToolResult> {
        let args: ListArgs = match parse_args(args) {
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

        let shown = target.display_path();
        let meta = match tokio::fs::metadata(&target.physical).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ctx.audit(NewAuditEntry::new(
                    &shown,
                    AuditAction::Read,
                    AuditStatus::NotFound,
                ))
                .await?;
                return Ok(ToolResult::failed(
                    FailureKind::NotFound,
                    format!("Directory not found: {shown}"),
                ));
            }
            Err(e) => return unreadable_audited(ctx, &shown, AuditAction::Read, &e).await,
        };

        let listing = if meta.is_dir() {
            match list_audited(ctx, &target, args.recursive).await? {
                Ok(listing) => listing,
                Err(denied) => return Ok(denied),
            }
        } else {
            let name = target
                .relative
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| shown.clone());
            Listing {
                entries: vec![DirEntry {
                    name,
                    kind: "file",
                    path: shown.clone(),
                }],
                ..Listing::default()
            }
        };

        ctx.audit(
            NewAuditEntry::new(&shown, AuditAction::Read, AuditStatus::Success)
                .output(format!("{} entries", listing.entries.len())),
        )
        .await?;

        let mut output = serde_json::to_string_pretty(&listing.entries)?;
        output.push_str(&listing.notes());
        Ok(ToolResult::ok(output))
    }
}
