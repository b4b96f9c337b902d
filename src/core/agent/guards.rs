use super::transcript::{ToolCallRecord, Transcript};
use crate::config::KernelConfig;
use crate::core::tools::FailureKind;

/// Advisory heuristic evaluated after every dispatch. Returns guidance text to append to
/// the transcript; never alters tool behavior.
pub trait LoopGuard: Send + Sync {
    fn name(&self) -> &str;

    fn inspect(&self, transcript: &Transcript) -> Option<String>;
}

const READ_TOOLS: &[&str] = &["read_file", "list_files"];

/// "Stuck re-reading": the same read of the same path keeps coming back.
#[derive(Debug, Clone)]
pub struct RepeatedReadGuard {
    window: usize,
    threshold: usize,
}

impl RepeatedReadGuard {
    pub fn new(window: usize, threshold: usize) -> Self {
        Self { window, threshold }
    }
}

impl LoopGuard for RepeatedReadGuard {
    fn name(&self) -> &str {
        "repeated_read"
    }

    fn inspect(&self, transcript: &Transcript) -> Option<String> {
        let recent = transcript.recent(self.window);
        let last = recent.last()?;
        if !READ_TOOLS.contains(&last.tool.as_str()) {
            return None;
        }
        let same = recent
            .iter()
            .filter(|r| r.tool == last.tool && r.target == last.target)
            .count();
        (same >= self.threshold).then(|| {
            format!(
                "You have called {} on '{}' {same} times recently. You already have its content: \
stop re-reading and act on it (propose_fix, run_command, or get_status to see the next step).",
                last.tool,
                last.target.as_deref().unwrap_or(".")
            )
        })
    }
}

/// "Stuck editing": proposals keep getting rejected or writes keep failing validation.
#[derive(Debug, Clone)]
pub struct RepeatedFailureGuard {
    window: usize,
    threshold: usize,
}

impl RepeatedFailureGuard {
    pub fn new(window: usize, threshold: usize) -> Self {
        Self { window, threshold }
    }

    fn is_edit_failure(record: &ToolCallRecord) -> bool {
        matches!(
            record.failure,
            Some(FailureKind::Rejected | FailureKind::ValidationFailed)
        )
    }
}

impl LoopGuard for RepeatedFailureGuard {
    fn name(&self) -> &str {
        "repeated_failure"
    }

    fn inspect(&self, transcript: &Transcript) -> Option<String> {
        let recent = transcript.recent(self.window);
        if !recent.last().is_some_and(Self::is_edit_failure) {
            return None;
        }
        let failures = recent.iter().filter(|r| Self::is_edit_failure(r)).count();
        (failures >= self.threshold).then(|| {
            format!(
                "{failures} of your recent edits were rejected or failed validation. Step back: \
re-read the auditor rationale and diagnostics, use checkpoint_manager load to recover the last \
approved version, and make a smaller, complete change."
            )
        })
    }
}

/// A write was refused for lack of approval; spell out the protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnapprovedWriteGuard;

impl LoopGuard for UnapprovedWriteGuard {
    fn name(&self) -> &str {
        "unapproved_write"
    }

    fn inspect(&self, transcript: &Transcript) -> Option<String> {
        let last = transcript.records().last()?;
        (last.tool == "write_fix" && last.failure == Some(FailureKind::ApprovalRequired)).then(
            || {
                format!(
                    "write_fix on '{}' was blocked: every write needs its own approved propose_fix \
for that exact path and content. Call propose_fix first, then write_fix once.",
                    last.target.as_deref().unwrap_or("?")
                )
            },
        )
    }
}

/// Built-in guards enabled by the kernel config.
pub fn guards_from_config(config: &KernelConfig) -> Vec<Box<dyn LoopGuard>> {
    let mut guards: Vec<Box<dyn LoopGuard>> = Vec::new();
    if config.guard_repeated_reads {
        guards.push(Box::new(RepeatedReadGuard::new(
            config.guard_window,
            config.guard_threshold,
        )));
    }
    if config.guard_repeated_failures {
        guards.push(Box::new(RepeatedFailureGuard::new(
            config.guard_window,
            config.guard_threshold,
        )));
    }
    if config.guard_unapproved_writes {
        guards.push(Box::new(UnapprovedWriteGuard));
    }
    guards
}
