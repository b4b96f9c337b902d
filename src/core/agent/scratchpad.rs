use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use tokio::io::AsyncWriteExt;

use crate::core::tools::ToolResult;

pub const SCRATCHPAD_FILE: &str = "scratchpad.md";

const ERROR_KEEP_CHARS: usize = 1500;
const DEFAULT_KEEP_CHARS: usize = 500;
const TRUNCATION_MARKER: &str = "[TRUNCATED]";

/// Markdown log of every dispatch, kept in the memory root for the agent to re-read.
#[derive(Debug, Clone)]
pub struct Scratchpad {
    path: PathBuf,
}

impl Scratchpad {
    pub fn new(memory_root: &Path) -> Self {
        Self {
            path: memory_root.join(SCRATCHPAD_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(
        &self,
        tool: &str,
        arguments: &str,
        result: &ToolResult,
    ) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create scratchpad directory {}", parent.display()))?;
        }

        let entry = format_entry(tool, arguments, result);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("open scratchpad {}", self.path.display()))?;
        file.write_all(entry.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

fn format_entry(tool: &str, arguments: &str, result: &ToolResult) -> String {
    let status = if result.success { "ok" } else { "failed" };
    format!(
        "## {} {tool} ({status})\nargs: {}\n\n{}\n\n",
        Utc::now().to_rfc3339(),
        clip(arguments, DEFAULT_KEEP_CHARS),
        summarize(result)
    )
}

/// Error-like results keep more context than routine output.
fn summarize(result: &ToolResult) -> String {
    let text = result.render();
    let error_like = !result.success || text.to_ascii_lowercase().contains("error");
    let keep = if error_like {
        ERROR_KEEP_CHARS
    } else {
        DEFAULT_KEEP_CHARS
    };
    clip(&text, keep)
}

fn clip(text: &str, keep: usize) -> String {
    if text.len() <= keep {
        return text.to_string();
    }
    let cut = text.floor_char_boundary(keep);
    format!("{}\n{TRUNCATION_MARKER}", &text[..cut])
}
