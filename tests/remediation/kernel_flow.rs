use std::sync::Arc;

use patchwarden::core::agent::{
    FailureReason, Kernel, RemediationTask, SessionOutcome, guards_from_config,
};
use patchwarden::core::providers::{ModelTurn, Role};
use patchwarden::core::tools::{FailureKind, remediation_tools};
use patchwarden::config::KernelConfig;
use patchwarden::store::{AuditAction, AuditStatus};
use patchwarden::verify::{Diagnostic, LintReport, NoopLinter};
use serde_json::json;

use crate::harness::{
    Harness, MEMORY_PREFIX, MockProvider, RecordingVcs, ScriptedAuditor, ScriptedLinter, call,
};

const VULNERABLE: &str = "import { db } from './db';\n\nexport function findUser(id) {\n  return db.query(`SELECT * FROM users WHERE id = ${id}`);\n}\n";
const FIXED: &str = "import { db } from './db';\n\nexport function findUser(id) {\n  return db.query('SELECT * FROM users WHERE id = ?', [id]);\n}\n";

fn kernel(provider: Arc<MockProvider>, vcs: Arc<RecordingVcs>) -> Kernel {
    Kernel::new(provider, remediation_tools(), vcs)
        .with_guards(guards_from_config(&KernelConfig::default()))
}

fn task() -> RemediationTask {
    RemediationTask::new("src/db.ts", "SQL injection in findUser")
        .with_details("user input interpolated into a SQL string")
}

#[tokio::test]
async fn rejected_then_approved_fix_completes_the_session() {
    let auditor = ScriptedAuditor::with_verdicts(&[false, true]);
    let mut h = Harness::with(auditor.clone(), Arc::new(NoopLinter)).await;
    h.write("src/db.ts", VULNERABLE);

    let provider = MockProvider::new(vec![
        ModelTurn::with_calls(vec![call("1", "read_file", json!({"path": "src/db.ts"}))]),
        ModelTurn::with_calls(vec![call(
            "2",
            "propose_fix",
            json!({"path": "src/db.ts", "code": VULNERABLE.replace("users", "accounts")}),
        )]),
        ModelTurn::with_calls(vec![
            call("3", "propose_fix", json!({"path": "src/db.ts", "code": FIXED})),
            call("4", "write_fix", json!({"path": "src/db.ts", "code": FIXED})),
        ]),
        ModelTurn::with_calls(vec![call("5", "get_status", json!({"path": "src/db.ts"}))]),
        ModelTurn::text("The query is parameterized now. REMEDIATION_COMPLETE"),
    ]);
    let vcs = RecordingVcs::new();

    let report = kernel(provider.clone(), vcs.clone())
        .run(&mut h.ctx, &task())
        .await;

    assert_eq!(report.outcome, SessionOutcome::Success);
    assert_eq!(report.steps, 5);
    assert_eq!(report.tool_calls, 5);
    assert_eq!(report.failure_count(FailureKind::Rejected), 1);
    assert_eq!(h.read("src/db.ts"), FIXED);
    assert!(vcs.rollbacks().is_empty());
    assert_eq!(auditor.requests().len(), 2);
    assert!(h.ctx.transcript.calls_are_answered());

    let log = h.ctx.audit.query(20, None).await.unwrap();
    let trail: Vec<(AuditAction, AuditStatus)> =
        log.iter().rev().map(|e| (e.action, e.status)).collect();
    assert_eq!(
        trail,
        vec![
            (AuditAction::Read, AuditStatus::Success),
            (AuditAction::Propose, AuditStatus::Rejected),
            (AuditAction::Propose, AuditStatus::Success),
            (AuditAction::WriteSrc, AuditStatus::Success),
        ]
    );
    assert!(log.iter().all(|e| e.session_id.as_deref() == Some(h.ctx.id.as_str())));
}

#[tokio::test]
async fn system_prompt_describes_tools_and_memory() {
    let mut h = Harness::new().await;
    h.write("src/db.ts", VULNERABLE);
    let provider = MockProvider::new(vec![ModelTurn::text("REMEDIATION_COMPLETE")]);

    kernel(provider.clone(), RecordingVcs::new())
        .run(&mut h.ctx, &task())
        .await;

    let seen = provider.last_transcript();
    assert_eq!(seen[0].role, Role::System);
    for tool in ["propose_fix", "write_fix", "run_command", "get_knowledge"] {
        assert!(seen[0].content.contains(tool), "{tool}");
    }
    assert!(seen[0].content.contains(MEMORY_PREFIX));
    assert_eq!(seen[1].role, Role::User);
    assert!(seen[1].content.contains("src/db.ts"));
    assert!(seen[1].content.contains("user input interpolated"));
}

#[tokio::test]
async fn linter_crash_is_fatal_and_rolls_back() {
    let mut h = Harness::with(ScriptedAuditor::approving(), ScriptedLinter::crashing()).await;
    h.write("src/db.ts", VULNERABLE);

    let provider = MockProvider::new(vec![ModelTurn::with_calls(vec![
        call("1", "propose_fix", json!({"path": "src/db.ts", "code": FIXED})),
        call("2", "write_fix", json!({"path": "src/db.ts", "code": FIXED})),
        call("3", "run_command", json!({"command": "npm test"})),
    ])]);
    let vcs = RecordingVcs::new();

    let report = kernel(provider.clone(), vcs.clone())
        .run(&mut h.ctx, &task())
        .await;

    match &report.outcome {
        SessionOutcome::Failure {
            reason: FailureReason::Fatal(detail),
        } => assert!(detail.contains("linter binary vanished"), "{detail}"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(vcs.rollbacks(), vec![h.project.clone()]);
    assert_eq!(provider.requests(), 1);
    assert_eq!(report.tool_calls, 2);
    assert!(h.ctx.transcript.calls_are_answered());
    let last = h.ctx.transcript.messages().last().unwrap();
    assert!(last.content.starts_with("SKIPPED"));
}

#[tokio::test]
async fn lint_failure_becomes_evidence_for_the_next_review() {
    let auditor = ScriptedAuditor::approving();
    let linter = ScriptedLinter::reporting(LintReport::Diagnostics(vec![Diagnostic::new(
        "lint/style/useConst",
        "This let declares a variable that is only assigned once.",
    )]));
    let mut h = Harness::with(auditor.clone(), linter).await;
    h.write("src/db.ts", VULNERABLE);

    let provider = MockProvider::new(vec![
        ModelTurn::with_calls(vec![
            call("1", "propose_fix", json!({"path": "src/db.ts", "code": FIXED})),
            call("2", "write_fix", json!({"path": "src/db.ts", "code": FIXED})),
        ]),
        ModelTurn::with_calls(vec![call(
            "3",
            "propose_fix",
            json!({"path": "src/db.ts", "code": FIXED}),
        )]),
        ModelTurn::text("REMEDIATION_COMPLETE"),
    ]);

    let report = kernel(provider, RecordingVcs::new())
        .run(&mut h.ctx, &task())
        .await;

    assert_eq!(report.outcome, SessionOutcome::Success);
    assert_eq!(report.failure_count(FailureKind::ValidationFailed), 1);
    // The file stays as written.
    assert_eq!(h.read("src/db.ts"), FIXED);

    let requests = auditor.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].evidence.is_none());
    assert!(
        requests[1]
            .evidence
            .as_deref()
            .unwrap()
            .contains("useConst")
    );
    let lint_errors = h
        .ctx
        .audit
        .query(10, Some(AuditStatus::LintError))
        .await
        .unwrap();
    assert_eq!(lint_errors.len(), 1);
}

#[tokio::test]
async fn every_dispatch_lands_in_the_scratchpad() {
    let mut h = Harness::new().await;
    h.write("src/db.ts", VULNERABLE);
    let provider = MockProvider::new(vec![
        ModelTurn::with_calls(vec![
            call("1", "read_file", json!({"path": "src/db.ts"})),
            call("2", "read_file", json!({"path": "../escape.ts"})),
        ]),
        ModelTurn::text("REMEDIATION_COMPLETE"),
    ]);

    kernel(provider, RecordingVcs::new())
        .run(&mut h.ctx, &task())
        .await;

    let pad = std::fs::read_to_string(h.memory.join("scratchpad.md")).unwrap();
    assert_eq!(pad.matches("read_file (ok)").count(), 1);
    assert_eq!(pad.matches("read_file (failed)").count(), 1);
}

#[tokio::test]
async fn unapproved_write_is_blocked_and_nudged() {
    let mut h = Harness::new().await;
    h.write("src/db.ts", VULNERABLE);
    let provider = MockProvider::new(vec![
        ModelTurn::with_calls(vec![call(
            "1",
            "write_fix",
            json!({"path": "src/db.ts", "code": FIXED}),
        )]),
        ModelTurn::text("REMEDIATION_COMPLETE"),
    ]);

    let report = kernel(provider, RecordingVcs::new())
        .run(&mut h.ctx, &task())
        .await;

    assert_eq!(report.failure_count(FailureKind::ApprovalRequired), 1);
    assert_eq!(h.read("src/db.ts"), VULNERABLE);
    let messages = h.ctx.transcript.messages();
    let tool_at = messages.iter().position(|m| m.role == Role::Tool).unwrap();
    assert_eq!(messages[tool_at + 1].role, Role::System);
    assert!(messages[tool_at + 1].content.contains("propose_fix"));
}

#[tokio::test]
async fn filesystem_shape_mistakes_stay_recoverable() {
    let mut h = Harness::new().await;
    h.write("src/db.ts", VULNERABLE);
    std::fs::write(h.project.join("src/blob.ts"), [0xff, 0xfe, 0x00]).unwrap();

    let provider = MockProvider::new(vec![
        ModelTurn::with_calls(vec![
            call("1", "propose_fix", json!({"path": "src", "code": FIXED})),
            call("2", "checkpoint_manager", json!({"action": "save", "path": "src"})),
            call("3", "read_file", json!({"path": "src"})),
        ]),
        ModelTurn::with_calls(vec![
            call("4", "propose_fix", json!({"path": "src/blob.ts", "code": FIXED})),
            call("5", "write_fix", json!({"path": "src/blob.ts", "code": FIXED})),
        ]),
        ModelTurn::text("REMEDIATION_COMPLETE"),
    ]);
    let vcs = RecordingVcs::new();

    let report = kernel(provider.clone(), vcs.clone())
        .run(&mut h.ctx, &task())
        .await;

    assert_eq!(report.outcome, SessionOutcome::Success, "{report:?}");
    assert!(vcs.rollbacks().is_empty());
    assert_eq!(provider.requests(), 3);
    assert_eq!(report.tool_calls, 5);
    assert_eq!(report.failure_count(FailureKind::NotFound), 2);
    assert_eq!(h.read("src/blob.ts"), FIXED);

    let replies: Vec<&str> = h
        .ctx
        .transcript
        .messages()
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.content.as_str())
        .collect();
    assert!(replies[0].contains("is a directory"));
    assert!(replies[1].contains("is a directory"));
    assert!(replies[2].starts_with("DIRECTORY_LISTING [src]"));
    assert!(replies.iter().all(|r| !r.starts_with("FATAL")));
}

#[cfg(unix)]
#[tokio::test]
async fn unreadable_directory_does_not_end_the_session() {
    use std::os::unix::fs::PermissionsExt;

    let mut h = Harness::new().await;
    h.write("src/db.ts", VULNERABLE);
    h.write("vendor/lib.ts", "x");
    let vendor = h.project.join("vendor");
    std::fs::set_permissions(&vendor, std::fs::Permissions::from_mode(0o000)).unwrap();

    let provider = MockProvider::new(vec![
        ModelTurn::with_calls(vec![
            call("1", "list_files", json!({"recursive": true})),
            call("2", "read_file", json!({"path": "vendor"})),
        ]),
        ModelTurn::text("REMEDIATION_COMPLETE"),
    ]);
    let vcs = RecordingVcs::new();

    let report = kernel(provider, vcs.clone()).run(&mut h.ctx, &task()).await;
    std::fs::set_permissions(&vendor, std::fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(report.outcome, SessionOutcome::Success, "{report:?}");
    assert!(vcs.rollbacks().is_empty());
    assert_eq!(report.tool_calls, 2);
}
