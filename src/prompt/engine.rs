use anyhow::Context as _;
use tera::Tera;

use crate::config::PromptConfig;

pub const SYSTEM_PROMPT_NAME: &str = "system_prompt";
pub const TASK_PROMPT_NAME: &str = "task_prompt";

/// Tera-backed renderer for the session prompts.
///
/// Built-in templates are registered first; operator templates from `[prompt]`
/// replace them by name.
pub struct TeraEngine {
    tera: Tera,
}

impl TeraEngine {
    /// Create with inline templates (no filesystem).
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
        }
    }

    /// Engine with the built-in templates and any configured overrides.
    pub fn from_config(config: &PromptConfig) -> anyhow::Result<Self> {
        let mut engine = Self::new();
        super::builder::register_defaults(&mut engine)?;
        if let Some(system) = &config.system_template {
            engine
                .add_template(SYSTEM_PROMPT_NAME, system)
                .context("invalid prompt.system_template")?;
        }
        if let Some(task) = &config.task_template {
            engine
                .add_template(TASK_PROMPT_NAME, task)
                .context("invalid prompt.task_template")?;
        }
        Ok(engine)
    }

    /// Register a template from a string, replacing any with the same name.
    pub fn add_template(&mut self, name: &str, content: &str) -> anyhow::Result<()> {
        self.tera.add_raw_template(name, content)?;
        Ok(())
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    /// Render a named template with the given context.
    pub fn render(&self, template_name: &str, context: &tera::Context) -> anyhow::Result<String> {
        self.tera
            .render(template_name, context)
            .with_context(|| format!("render template '{template_name}'"))
    }
}

impl Default for TeraEngine {
    fn default() -> Self {
        Self::new()
    }
}
