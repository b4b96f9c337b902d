mod command;
mod path;
mod types;

pub use command::{CommandLimits, CommandOutput};
pub use path::normalize_lexically;
pub use types::{ResolvedPath, SandboxRoot};

use crate::config::{CommandsConfig, SandboxConfig};
use crate::error::ConfigError;
use std::path::{Path, PathBuf};

pub const PROJECT_ROOT_NAME: &str = "project";
pub const MEMORY_ROOT_NAME: &str = "memory";

/// Sandbox policy enforced on every path and command the agent supplies.
///
/// Holds the sandbox roots (the first is the primary project root), the restricted
/// path components, and the fixed command allowlist. Immutable once built.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    roots: Vec<SandboxRoot>,
    restricted: Vec<String>,
    allowed_commands: Vec<String>,
}

impl SandboxPolicy {
    /// Build a policy. Fails if there are no roots, a root is relative, or two roots nest.
    pub fn new(
        roots: Vec<SandboxRoot>,
        restricted: Vec<String>,
        allowed_commands: Vec<String>,
    ) -> Result<Self, ConfigError> {
        if roots.is_empty() {
            return Err(ConfigError::Validation(
                "at least one sandbox root is required".into(),
            ));
        }

        let mut normalized = Vec::with_capacity(roots.len());
        for root in roots {
            if !root.path.is_absolute() {
                return Err(ConfigError::Validation(format!(
                    "sandbox root '{}' must be absolute: {}",
                    root.name,
                    root.path.display()
                )));
            }
            let path = normalize_lexically(&root.path).ok_or_else(|| {
                ConfigError::Validation(format!("invalid sandbox root: {}", root.path.display()))
            })?;
            normalized.push(SandboxRoot { path, ..root });
        }

        for (i, a) in normalized.iter().enumerate() {
            for b in normalized.iter().skip(i + 1) {
                if a.path.starts_with(&b.path) || b.path.starts_with(&a.path) {
                    return Err(ConfigError::Validation(format!(
                        "sandbox roots '{}' and '{}' overlap",
                        a.name, b.name
                    )));
                }
            }
        }

        Ok(Self {
            roots: normalized,
            restricted,
            allowed_commands,
        })
    }

    /// Build from config sections, with roots already expanded to absolute paths.
    pub fn from_config(
        sandbox: &SandboxConfig,
        commands: &CommandsConfig,
        project_root: &Path,
        memory_root: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut roots = vec![SandboxRoot::new(
            PROJECT_ROOT_NAME,
            canonical_or_self(project_root),
        )];
        if let Some(memory_root) = memory_root {
            roots.push(
                SandboxRoot::new(MEMORY_ROOT_NAME, canonical_or_self(memory_root))
                    .with_prefix(sandbox.memory_prefix.clone()),
            );
        }
        Self::new(
            roots,
            sandbox.restricted_paths.clone(),
            commands.allowed_prefixes.clone(),
        )
    }

    pub fn roots(&self) -> &[SandboxRoot] {
        &self.roots
    }

    /// The primary root; commands always run here.
    pub fn project_root(&self) -> &Path {
        &self.roots[0].path
    }

    pub fn memory_root(&self) -> Option<&Path> {
        self.roots
            .iter()
            .find(|r| r.name == MEMORY_ROOT_NAME)
            .map(|r| r.path.as_path())
    }

    pub fn restricted(&self) -> &[String] {
        &self.restricted
    }

    pub fn allowed_commands(&self) -> &[String] {
        &self.allowed_commands
    }
}

fn canonical_or_self(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
