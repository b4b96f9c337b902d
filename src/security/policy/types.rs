use std::path::{Path, PathBuf};

/// A directory boundary outside of which no file operation may resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRoot {
    pub name: String,
    pub path: PathBuf,
    /// Leading path component that addresses this root directly (e.g. `.agent_memory`).
    pub virtual_prefix: Option<String>,
}

impl SandboxRoot {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            virtual_prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.virtual_prefix = Some(prefix.into());
        self
    }
}

/// Outcome of a successful resolution: the physical path plus the root it lies under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub root: String,
    pub root_path: PathBuf,
    pub physical: PathBuf,
    pub relative: PathBuf,
    virtual_prefix: Option<String>,
}

impl ResolvedPath {
    pub(super) fn new(root: &SandboxRoot, physical: PathBuf, relative: PathBuf) -> Self {
        Self {
            root: root.name.clone(),
            root_path: root.path.clone(),
            physical,
            relative,
            virtual_prefix: root.virtual_prefix.clone(),
        }
    }

    /// Normalized virtual form, stable across aliases such as `./a.ts` and `a.ts`.
    ///
    /// Used as the key for audit entries and checkpoints.
    pub fn display_path(&self) -> String {
        let relative = self
            .relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        match (&self.virtual_prefix, relative.is_empty()) {
            (Some(prefix), true) => prefix.clone(),
            (Some(prefix), false) => format!("{prefix}/{relative}"),
            (None, true) => ".".to_string(),
            (None, false) => relative,
        }
    }

    pub fn as_path(&self) -> &Path {
        &self.physical
    }

    /// File name looks like a test (`a.test.ts`, `a.spec.js`) or lives under a test directory.
    pub fn is_test_file(&self) -> bool {
        let name_is_test = self
            .relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .is_some_and(|n| n.contains(".test.") || n.contains(".spec."));
        let dir_is_test = self.relative.components().any(|c| {
            matches!(
                c.as_os_str().to_str(),
                Some("test" | "tests" | "__tests__" | "spec")
            )
        });
        name_is_test || dir_is_test
    }
}
