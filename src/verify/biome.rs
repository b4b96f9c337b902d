use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::{Diagnostic, LintReport, Linter};

const REPORTER_FLAG: &str = "--reporter=json";
const MAX_RAW_DIAGNOSTIC_CHARS: usize = 2000;

/// Runs Biome (or anything speaking its JSON reporter format) on single files.
pub struct BiomeLinter {
    program: String,
    args: Vec<String>,
    extensions: Vec<String>,
    timeout: Duration,
}

impl BiomeLinter {
    pub fn new(command: &str, extensions: Vec<String>, timeout: Duration) -> Self {
        let mut tokens = command.split_whitespace().map(String::from);
        let program = tokens.next().unwrap_or_else(|| "npx".to_string());
        Self {
            program,
            args: tokens.collect(),
            extensions: extensions
                .into_iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            timeout,
        }
    }

    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| *allowed == ext))
    }
}

#[async_trait]
impl Linter for BiomeLinter {
    fn name(&self) -> &str {
        "biome"
    }

    async fn lint(&self, path: &Path, root: &Path) -> anyhow::Result<LintReport> {
        if !self.supports(path) {
            return Ok(LintReport::Skipped);
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(REPORTER_FLAG)
            .arg(path)
            .current_dir(root)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| anyhow::anyhow!("linter timed out after {}s", self.timeout.as_secs()))?
            .with_context(|| format!("failed to run linter '{}'", self.program))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            path = %path.display(),
            status = ?output.status.code(),
            stdout_len = stdout.len(),
            "linter finished"
        );

        Ok(interpret(output.status.success(), &stdout, &stderr))
    }
}

fn interpret(success: bool, stdout: &str, stderr: &str) -> LintReport {
    match parse_biome_report(stdout) {
        Some(diagnostics) if !diagnostics.is_empty() => LintReport::Diagnostics(diagnostics),
        Some(_) if success => LintReport::Clean,
        None if success => LintReport::Clean,
        _ => {
            let mut raw = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            if raw.is_empty() {
                raw = "linter exited with failure and no output".to_string();
            }
            if raw.len() > MAX_RAW_DIAGNOSTIC_CHARS {
                let cut = raw.floor_char_boundary(MAX_RAW_DIAGNOSTIC_CHARS);
                raw.truncate(cut);
                raw.push_str("...");
            }
            LintReport::Diagnostics(vec![Diagnostic::new("raw", raw)])
        }
    }
}

#[derive(Deserialize)]
struct BiomeOutput {
    #[serde(default)]
    diagnostics: Vec<BiomeDiagnostic>,
}

#[derive(Deserialize)]
struct BiomeDiagnostic {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    message: Option<serde_json::Value>,
}

/// Parse Biome's JSON reporter output. `None` when the text is not a JSON report.
pub fn parse_biome_report(stdout: &str) -> Option<Vec<Diagnostic>> {
    // The reporter may be preceded by npx noise; the report is the last JSON object line.
    let report = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with('{'))?;
    let parsed: BiomeOutput = serde_json::from_str(report).ok()?;
    Some(
        parsed
            .diagnostics
            .into_iter()
            .map(|d| {
                let description = d
                    .description
                    .or_else(|| d.message.map(|m| message_text(&m)))
                    .unwrap_or_default();
                Diagnostic::new(d.category.unwrap_or_else(|| "unknown".into()), description)
            })
            .collect(),
    )
}

fn message_text(message: &serde_json::Value) -> String {
    match message {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("content").and_then(|c| c.as_str()))
            .collect::<String>(),
        other => other.to_string(),
    }
}
