mod biome;

pub use biome::{BiomeLinter, parse_biome_report};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{LinterKind, VerifyConfig};

/// One linter finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub category: String,
    pub description: String,
}

impl Diagnostic {
    pub fn new(category: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LintReport {
    /// The linter does not handle this file type.
    Skipped,
    Clean,
    Diagnostics(Vec<Diagnostic>),
}

impl LintReport {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Diagnostics(d) if !d.is_empty())
    }

    /// Diagnostics as one `category: description` line each.
    pub fn render(&self) -> String {
        match self {
            Self::Skipped => "lint skipped (unsupported file type)".to_string(),
            Self::Clean => "lint clean".to_string(),
            Self::Diagnostics(items) => items
                .iter()
                .map(|d| format!("{}: {}", d.category, d.description))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Static analysis run against a file after it is written.
#[async_trait]
pub trait Linter: Send + Sync {
    fn name(&self) -> &str;

    /// Lint `path` with `root` as the working directory.
    ///
    /// An `Err` means the linter itself could not run.
    async fn lint(&self, path: &Path, root: &Path) -> anyhow::Result<LintReport>;
}

/// Linter for environments without one: every file is skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLinter;

#[async_trait]
impl Linter for NoopLinter {
    fn name(&self) -> &str {
        "none"
    }

    async fn lint(&self, _path: &Path, _root: &Path) -> anyhow::Result<LintReport> {
        Ok(LintReport::Skipped)
    }
}

pub fn linter_from_config(config: &VerifyConfig) -> Arc<dyn Linter> {
    match config.linter {
        LinterKind::Biome => Arc::new(BiomeLinter::new(
            &config.linter_command,
            config.lint_extensions.clone(),
            Duration::from_secs(config.lint_timeout_secs),
        )),
        LinterKind::None => Arc::new(NoopLinter),
    }
}
