use crate::error::ConfigError;
use crate::security::{
    default_allowed_commands, default_ignored_entries, default_restricted_paths,
    default_structural_markers,
};
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Chaining characters that may never appear in an allowlist entry.
const ALLOWLIST_FORBIDDEN_CHARS: &[char] = &['&', '|', ';', '\n', '`', '$', '<', '>'];

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub commands: CommandsConfig,

    #[serde(default)]
    pub kernel: KernelConfig,

    #[serde(default)]
    pub write_guard: WriteGuardConfig,

    #[serde(default)]
    pub verify: VerifyConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    #[serde(default)]
    pub prompt: PromptConfig,

    #[serde(default)]
    pub vcs: VcsConfig,
}

// ── Model ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// OpenAI-compatible API base (the `/chat/completions` suffix is added)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Model used by the auditor; defaults to `model`
    #[serde(default)]
    pub auditor_model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_temperature() -> f64 {
    0.2
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            auditor_model: None,
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ModelConfig {
    pub fn auditor_model(&self) -> &str {
        self.auditor_model.as_deref().unwrap_or(&self.model)
    }
}

// ── Sandbox ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Target codebase; relative paths are taken from the working directory
    #[serde(default = "default_project_root")]
    pub project_root: String,
    /// Agent scratch space, addressed through `memory_prefix`. Must not overlap the project
    #[serde(default = "default_memory_root")]
    pub memory_root: Option<String>,
    #[serde(default = "default_memory_prefix")]
    pub memory_prefix: String,
    #[serde(default = "default_restricted_paths")]
    pub restricted_paths: Vec<String>,
    #[serde(default = "default_ignored_entries")]
    pub ignored_entries: Vec<String>,
}

fn default_project_root() -> String {
    ".".into()
}

#[allow(clippy::unnecessary_wraps)]
fn default_memory_root() -> Option<String> {
    Some("~/.patchwarden/memory".into())
}

fn default_memory_prefix() -> String {
    ".agent_memory".into()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            memory_root: default_memory_root(),
            memory_prefix: default_memory_prefix(),
            restricted_paths: default_restricted_paths(),
            ignored_entries: default_ignored_entries(),
        }
    }
}

// ── Commands ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// Token-wise command prefixes; fixed for the lifetime of a session
    #[serde(default = "default_allowed_commands")]
    pub allowed_prefixes: Vec<String>,
    #[serde(default = "default_command_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_command_timeout_secs() -> u64 {
    60
}

fn default_max_output_bytes() -> usize {
    1_048_576
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            allowed_prefixes: default_allowed_commands(),
            timeout_secs: default_command_timeout_secs(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

// ── Kernel ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Model turns before the session ends as budget exhausted
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_termination_signal")]
    pub termination_signal: String,
    #[serde(default = "default_true")]
    pub guard_repeated_reads: bool,
    #[serde(default = "default_true")]
    pub guard_repeated_failures: bool,
    #[serde(default = "default_true")]
    pub guard_unapproved_writes: bool,
    /// Recent dispatches the repetition guards look at
    #[serde(default = "default_guard_window")]
    pub guard_window: usize,
    /// Occurrences within the window that trigger a nudge
    #[serde(default = "default_guard_threshold")]
    pub guard_threshold: usize,
    #[serde(default)]
    pub rollback_on_budget_exhausted: bool,
}

fn default_max_steps() -> u32 {
    15
}

fn default_termination_signal() -> String {
    "REMEDIATION_COMPLETE".into()
}

fn default_guard_window() -> usize {
    6
}

fn default_guard_threshold() -> usize {
    3
}

fn default_true() -> bool {
    true
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            termination_signal: default_termination_signal(),
            guard_repeated_reads: true,
            guard_repeated_failures: true,
            guard_unapproved_writes: true,
            guard_window: default_guard_window(),
            guard_threshold: default_guard_threshold(),
            rollback_on_budget_exhausted: false,
        }
    }
}

// ── Write guard ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteGuardConfig {
    /// New content shorter than this fraction of the current file is refused
    #[serde(default = "default_min_length_ratio")]
    pub min_length_ratio: f64,
    #[serde(default = "default_structural_markers")]
    pub structural_markers: Vec<String>,
    /// write_fix must carry exactly the approved content
    #[serde(default = "default_true")]
    pub bind_content: bool,
}

fn default_min_length_ratio() -> f64 {
    0.3
}

impl Default for WriteGuardConfig {
    fn default() -> Self {
        Self {
            min_length_ratio: default_min_length_ratio(),
            structural_markers: default_structural_markers(),
            bind_content: true,
        }
    }
}

// ── Verification ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinterKind {
    #[default]
    Biome,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    #[serde(default)]
    pub linter: LinterKind,
    /// Linter invocation; the JSON reporter flag and file path are appended
    #[serde(default = "default_linter_command")]
    pub linter_command: String,
    #[serde(default = "default_lint_extensions")]
    pub lint_extensions: Vec<String>,
    #[serde(default = "default_lint_timeout_secs")]
    pub lint_timeout_secs: u64,
    /// Optional test invocation run through the command gate after a clean lint
    #[serde(default)]
    pub post_write_test: Option<String>,
}

fn default_linter_command() -> String {
    "npx @biomejs/biome check".into()
}

fn default_lint_extensions() -> Vec<String> {
    ["js", "jsx", "ts", "tsx", "mjs", "cjs", "json"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_lint_timeout_secs() -> u64 {
    60
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            linter: LinterKind::Biome,
            linter_command: default_linter_command(),
            lint_extensions: default_lint_extensions(),
            lint_timeout_secs: default_lint_timeout_secs(),
            post_write_test: None,
        }
    }
}

// ── Store ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Clear the audit log and checkpoints when a session starts
    #[serde(default)]
    pub reset_on_session_start: bool,
}

fn default_database_path() -> String {
    "~/.patchwarden/patchwarden.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            reset_on_session_start: false,
        }
    }
}

// ── Knowledge / prompts / VCS ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KnowledgeConfig {
    /// JSON library `{key: {title, description, code}}`
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptConfig {
    /// Tera template overriding the built-in system prompt
    #[serde(default)]
    pub system_template: Option<String>,
    /// Tera template overriding the built-in task prompt
    #[serde(default)]
    pub task_template: Option<String>,
    /// Overrides the auditor's review instructions
    #[serde(default)]
    pub auditor_instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcsConfig {
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
}

fn default_remote() -> String {
    "origin".into()
}

fn default_base_branch() -> String {
    "master".into()
}

fn default_branch_prefix() -> String {
    "fix/security-remediation-".into()
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            base_branch: default_base_branch(),
            branch_prefix: default_branch_prefix(),
        }
    }
}

// ── Paths ────────────────────────────────────────────────────────

/// Expand `~/` and make relative paths absolute against the working directory.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::tilde(raw).into_owned();
    let path = PathBuf::from(expanded);
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("Could not determine working directory")?;
    Ok(cwd.join(path))
}

fn default_config_path() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".patchwarden").join("config.toml"))
}

// ── Loading / saving ─────────────────────────────────────────────

impl Config {
    /// Load `~/.patchwarden/config.toml` (or `path`), writing defaults on first run.
    pub fn load_or_init(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };

        if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config = toml::from_str(&contents)
                .map_err(|e| ConfigError::Load(e.to_string()))
                .context("Failed to parse config file")?;
            config.config_path.clone_from(&config_path);
            Ok(config)
        } else {
            let config = Self {
                config_path,
                ..Self::default()
            };
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        // API key: PATCHWARDEN_API_KEY, falling back to OPENAI_API_KEY
        if let Ok(key) =
            std::env::var("PATCHWARDEN_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
            && !key.is_empty()
        {
            self.model.api_key = Some(key);
        }

        if let Ok(url) = std::env::var("PATCHWARDEN_BASE_URL")
            && !url.is_empty()
        {
            self.model.base_url = url;
        }

        if let Ok(model) = std::env::var("PATCHWARDEN_MODEL")
            && !model.is_empty()
        {
            self.model.model = model;
        }

        if let Ok(root) = std::env::var("PATCHWARDEN_PROJECT_ROOT")
            && !root.is_empty()
        {
            self.sandbox.project_root = root;
        }

        if let Ok(steps) = std::env::var("PATCHWARDEN_MAX_STEPS")
            && let Ok(steps) = steps.parse::<u32>()
        {
            self.kernel.max_steps = steps;
        }
    }

    pub fn project_root(&self) -> Result<PathBuf> {
        expand_path(&self.sandbox.project_root)
    }

    pub fn memory_root(&self) -> Result<Option<PathBuf>> {
        self.sandbox
            .memory_root
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .map(expand_path)
            .transpose()
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        expand_path(&self.store.database_path)
    }

    pub fn knowledge_path(&self) -> Result<Option<PathBuf>> {
        self.knowledge.path.as_deref().map(expand_path).transpose()
    }

    /// Reject settings the kernel cannot run safely with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Validation(msg));

        if self.kernel.max_steps == 0 {
            return invalid("kernel.max_steps must be >= 1".into());
        }
        if self.kernel.termination_signal.trim().is_empty() {
            return invalid("kernel.termination_signal must not be empty".into());
        }
        if self.kernel.guard_threshold == 0 || self.kernel.guard_window < self.kernel.guard_threshold
        {
            return invalid(
                "kernel.guard_threshold must be >= 1 and <= kernel.guard_window".into(),
            );
        }

        let ratio = self.write_guard.min_length_ratio;
        if ratio.is_nan() || !(0.0..=1.0).contains(&ratio) {
            return invalid("write_guard.min_length_ratio must be in [0.0, 1.0]".into());
        }

        if self.commands.timeout_secs == 0 {
            return invalid("commands.timeout_secs must be >= 1".into());
        }
        for entry in &self.commands.allowed_prefixes {
            if entry.trim().is_empty() {
                return invalid("commands.allowed_prefixes must not contain empty entries".into());
            }
            if entry.contains(ALLOWLIST_FORBIDDEN_CHARS) {
                return invalid(format!(
                    "commands.allowed_prefixes entry '{entry}' contains a chaining metacharacter"
                ));
            }
        }

        if self.sandbox.memory_prefix.trim().is_empty()
            || self.sandbox.memory_prefix.contains(['/', '\\'])
        {
            return invalid("sandbox.memory_prefix must be a single path component".into());
        }

        if let (Ok(project), Ok(Some(memory))) = (self.project_root(), self.memory_root())
            && (project.starts_with(&memory) || memory.starts_with(&project))
        {
            return invalid(format!(
                "sandbox roots overlap: project {} and memory {}",
                project.display(),
                memory.display()
            ));
        }

        if let Some(test) = &self.verify.post_write_test
            && test.trim().is_empty()
        {
            return invalid("verify.post_write_test must not be empty when set".into());
        }

        Ok(())
    }
}
