use super::engine::{SYSTEM_PROMPT_NAME, TASK_PROMPT_NAME, TeraEngine};
use crate::core::agent::RemediationTask;
use crate::core::tools::ToolSpec;
use serde::Serialize;
use tera::Context;

const SYSTEM_PROMPT_TEMPLATE: &str = "\
You are a security remediation agent working inside a sandboxed project.
Every file change goes through review: call propose_fix with the complete new file content, \
and only after it is APPROVED call write_fix with the same path and code. \
An approval is good for exactly one write. Never send diffs or snippets.

## Tools
{% for tool in tools %}- {{ tool.name }}: {{ tool.description }}
{% endfor %}
## Rules
- Paths are relative to the project root. Dependency folders, VCS metadata and secret files are off limits.
- Tests go in the test directory, never under src/.
- Only allowlisted commands run, without a shell.
{% if memory_prefix %}- Keep notes under {{ memory_prefix }}/; they persist between sessions.
{% endif %}\
- You have {{ max_steps }} turns.

When the vulnerability is fixed and verified, reply with {{ termination_signal }}.";

const TASK_PROMPT_TEMPLATE: &str = "\
Remediate this vulnerability.

File: {{ target }}
Vulnerability: {{ vulnerability }}
{% if details %}
Details:
{{ details }}
{% endif %}";

#[derive(Serialize)]
struct ToolLine<'a> {
    name: &'a str,
    description: &'a str,
}

/// Inputs for the system prompt.
pub struct SystemPromptInput<'a> {
    pub tools: &'a [ToolSpec],
    pub termination_signal: &'a str,
    pub memory_prefix: Option<&'a str>,
    pub max_steps: u32,
}

/// Register the built-in templates.
pub(super) fn register_defaults(engine: &mut TeraEngine) -> anyhow::Result<()> {
    engine.add_template(SYSTEM_PROMPT_NAME, SYSTEM_PROMPT_TEMPLATE)?;
    engine.add_template(TASK_PROMPT_NAME, TASK_PROMPT_TEMPLATE)?;
    Ok(())
}

/// Build the system prompt that frames the session.
pub fn build_system_prompt(
    engine: &TeraEngine,
    input: &SystemPromptInput<'_>,
) -> anyhow::Result<String> {
    let tools: Vec<ToolLine<'_>> = input
        .tools
        .iter()
        .map(|t| ToolLine {
            name: &t.name,
            description: &t.description,
        })
        .collect();

    let mut ctx = Context::new();
    ctx.insert("tools", &tools);
    ctx.insert("termination_signal", input.termination_signal);
    ctx.insert("memory_prefix", &input.memory_prefix.unwrap_or_default());
    ctx.insert("max_steps", &input.max_steps);

    engine.render(SYSTEM_PROMPT_NAME, &ctx)
}

/// Build the opening user message describing the task.
pub fn build_task_prompt(engine: &TeraEngine, task: &RemediationTask) -> anyhow::Result<String> {
    let mut ctx = Context::new();
    ctx.insert("target", &task.target);
    ctx.insert("vulnerability", &task.vulnerability);
    ctx.insert("details", &task.details.as_deref().unwrap_or_default());

    engine.render(TASK_PROMPT_NAME, &ctx)
}
