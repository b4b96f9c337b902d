use std::path::{Component, Path, PathBuf};

use super::SandboxPolicy;
use super::types::{ResolvedPath, SandboxRoot};
use crate::error::AccessDenied;

/// Fold `.` and `..` components without touching the filesystem.
///
/// Returns `None` when `..` would climb above the filesystem root.
pub fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() || out.as_os_str().is_empty() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}

impl SandboxPolicy {
    /// Map an untrusted virtual path to a physical path under one of the sandbox roots.
    ///
    /// Pure: never touches disk. Symlinks are not followed here; writers must also
    /// call [`SandboxPolicy::check_on_disk`].
    pub fn resolve(&self, virtual_path: &str) -> Result<ResolvedPath, AccessDenied> {
        let trimmed = virtual_path.trim();
        if trimmed.is_empty() {
            return Err(AccessDenied::Empty);
        }

        // Block null bytes (can truncate paths in C-backed syscalls)
        if trimmed.contains('\0') {
            return Err(AccessDenied::NulByte);
        }

        // Block URL-encoded dots and separators (e.g. ..%2f, %2e%2e)
        let lower = trimmed.to_lowercase();
        if ["%2e", "%2f", "%5c"].iter().any(|seq| lower.contains(seq)) {
            return Err(AccessDenied::EncodedTraversal(trimmed.to_string()));
        }

        let input = Path::new(trimmed);
        let joined = if input.is_absolute() {
            input.to_path_buf()
        } else {
            let (base, rest) = self.split_virtual_prefix(input);
            base.path.join(rest)
        };

        let outside = || AccessDenied::OutsideRoots(trimmed.to_string());
        let normalized = normalize_lexically(&joined).ok_or_else(outside)?;

        let root = self
            .roots
            .iter()
            .find(|root| normalized.starts_with(&root.path))
            .ok_or_else(outside)?;
        let relative = normalized
            .strip_prefix(&root.path)
            .map_err(|_| outside())?
            .to_path_buf();

        if let Some(entry) = self.restricted_entry(&relative) {
            return Err(AccessDenied::Restricted {
                path: trimmed.to_string(),
                entry: entry.to_string(),
            });
        }

        Ok(ResolvedPath::new(root, normalized, relative))
    }

    /// Re-check containment against what is actually on disk.
    ///
    /// Canonicalizes the nearest existing ancestor (following symlinks) and requires it
    /// to stay under the root. Refuses a target that is itself a symlink.
    pub fn check_on_disk(&self, resolved: &ResolvedPath) -> Result<(), AccessDenied> {
        let escape = || AccessDenied::SymlinkEscape(resolved.display_path());

        if let Ok(meta) = std::fs::symlink_metadata(&resolved.physical)
            && meta.file_type().is_symlink()
        {
            return Err(escape());
        }

        let root = resolved
            .root_path
            .canonicalize()
            .unwrap_or_else(|_| resolved.root_path.clone());

        let mut probe = resolved.physical.as_path();
        loop {
            if let Ok(canonical) = probe.canonicalize() {
                return if canonical.starts_with(&root) {
                    Ok(())
                } else {
                    Err(escape())
                };
            }
            match probe.parent() {
                Some(parent) => probe = parent,
                None => return Err(escape()),
            }
        }
    }

    fn split_virtual_prefix<'a>(&self, input: &'a Path) -> (&SandboxRoot, &'a Path) {
        let mut components = input.components();
        if let Some(Component::Normal(first)) = components.next() {
            for root in &self.roots {
                if root
                    .virtual_prefix
                    .as_deref()
                    .is_some_and(|prefix| first.to_str() == Some(prefix))
                {
                    return (root, components.as_path());
                }
            }
        }
        (&self.roots[0], input)
    }

    /// Component-aware match: `.env` blocks `.env` and `.env.local` but not `.environment`.
    fn restricted_entry(&self, relative: &Path) -> Option<&str> {
        relative.components().find_map(|component| {
            let Component::Normal(part) = component else {
                return None;
            };
            let part = part.to_string_lossy();
            self.restricted
                .iter()
                .find(|entry| {
                    part == entry.as_str()
                        || part
                            .strip_prefix(entry.as_str())
                            .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('-'))
                })
                .map(String::as_str)
        })
    }
}
