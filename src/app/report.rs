use std::fmt::Write as _;

use crate::core::agent::{FailureReason, RollbackOutcome, SessionOutcome, SessionReport};
use crate::store::{AuditEntry, Checkpoint};
use crate::ui::style as ui;
use crate::vcs::PublishOutcome;

const FINAL_TEXT_PREVIEW: usize = 600;
const AUDIT_OUTPUT_PREVIEW: usize = 120;

fn preview(text: &str, max: usize) -> String {
    let line = text.replace('\n', " ");
    if line.len() <= max {
        return line;
    }
    format!("{}...", &line[..line.floor_char_boundary(max)])
}

fn outcome_line(outcome: &SessionOutcome) -> String {
    match outcome {
        SessionOutcome::Success => ui::success(outcome.label()),
        SessionOutcome::BudgetExhausted => ui::warning(outcome.label()),
        SessionOutcome::Failure { reason } => {
            let detail = match reason {
                FailureReason::Stalled => "stalled (two empty turns)".to_string(),
                FailureReason::Fatal(detail) => format!("fatal: {detail}"),
            };
            format!("{} {}", ui::failure(outcome.label()), detail)
        }
    }
}

/// Operator-facing summary of one session.
pub fn render_report(report: &SessionReport, published: Option<&PublishOutcome>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", ui::header("Remediation session"));
    let _ = writeln!(out, "  {}    {}", ui::label("session"), report.session_id);
    let _ = writeln!(out, "  {}    {}", ui::label("outcome"), outcome_line(&report.outcome));
    let _ = writeln!(out, "  {}      {}", ui::label("steps"), report.steps);
    let _ = writeln!(out, "  {} {}", ui::label("tool calls"), report.tool_calls);

    if !report.failures.is_empty() {
        let counts: Vec<String> = report
            .failures
            .iter()
            .map(|(kind, n)| format!("{kind}={n}"))
            .collect();
        let _ = writeln!(out, "  {}   {}", ui::label("failures"), counts.join(", "));
    }

    match &report.rollback {
        Some(RollbackOutcome::Completed) => {
            let _ = writeln!(out, "  {}   {}", ui::label("rollback"), "completed");
        }
        Some(RollbackOutcome::Failed(e)) => {
            let _ = writeln!(out, "  {}   {} {e}", ui::label("rollback"), ui::failure("failed"));
        }
        None => {}
    }

    if let Some(published) = published {
        let _ = writeln!(out, "  {}     {}", ui::label("branch"), published.branch);
        if let Some(url) = &published.pr_url {
            let _ = writeln!(out, "  {} {}", ui::label("pull request"), ui::url(url));
        }
    }

    if let Some(text) = &report.final_text {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", ui::dim(preview(text, FINAL_TEXT_PREVIEW)));
    }
    out
}

pub fn render_audit_entries(entries: &[AuditEntry]) -> String {
    if entries.is_empty() {
        return "No audit entries.\n".to_string();
    }
    let mut out = String::new();
    for e in entries {
        let _ = writeln!(
            out,
            "{} {} {:<10} {:<17} {}",
            ui::dim(format!("#{}", e.id)),
            ui::dim(&e.timestamp),
            e.action.to_string(),
            e.status.to_string(),
            ui::label(&e.path),
        );
        if !e.output.is_empty() {
            let _ = writeln!(out, "    {}", preview(&e.output, AUDIT_OUTPUT_PREVIEW));
        }
    }
    out
}

pub fn render_checkpoint_list(checkpoints: &[Checkpoint]) -> String {
    if checkpoints.is_empty() {
        return "No checkpoints.\n".to_string();
    }
    let mut out = String::new();
    for c in checkpoints {
        let origin = if c.is_reviewed() {
            ui::dim(c.origin)
        } else {
            ui::warning(c.origin)
        };
        let _ = writeln!(
            out,
            "{}  {} {} ({} bytes)",
            ui::label(&c.path),
            origin,
            ui::dim(&c.saved_at),
            c.content.len()
        );
    }
    out
}
