use patchwarden::core::tools::FailureKind;
use patchwarden::security::ApprovalState;
use patchwarden::verify::NoopLinter;
use serde_json::json;
use std::sync::Arc;

use crate::harness::{Harness, ScriptedAuditor};

const FIXED: &str = "export function findUser(db, id) {\n  return db.query('SELECT * FROM users WHERE id = ?', [id]);\n}\n";
const VULNERABLE: &str = "export function findUser(db, id) {\n  return db.query(`SELECT * FROM users WHERE id = ${id}`);\n}\n";

async fn project() -> Harness {
    let h = Harness::new().await;
    h.write("src/a.ts", VULNERABLE);
    h
}

#[tokio::test]
async fn approved_write_is_consumed_by_the_first_write() {
    let mut h = project().await;

    let proposal = h
        .call("propose_fix", json!({"path": "src/a.ts", "code": FIXED}))
        .await;
    assert!(proposal.success, "{}", proposal.render());

    let first = h
        .call("write_fix", json!({"path": "src/a.ts", "code": FIXED}))
        .await;
    assert!(first.success, "{}", first.render());
    assert_eq!(h.read("src/a.ts"), FIXED);

    let second = h
        .call("write_fix", json!({"path": "src/a.ts", "code": FIXED}))
        .await;
    assert_eq!(second.failure, Some(FailureKind::ApprovalRequired));
}

#[tokio::test]
async fn approval_for_one_path_never_authorizes_another() {
    let mut h = project().await;

    h.call("propose_fix", json!({"path": "src/a.ts", "code": FIXED}))
        .await;
    let cross = h
        .call(
            "write_fix",
            json!({"path": "tests/a.test.ts", "code": "test('x', () => {});\n"}),
        )
        .await;

    assert_eq!(cross.failure, Some(FailureKind::ApprovalRequired));
    assert!(!h.project.join("tests/a.test.ts").exists());
    // The approval for src/a.ts is still live.
    let target = h.ctx.policy.resolve("src/a.ts").unwrap();
    assert_eq!(
        h.ctx.approvals.state(&target.physical),
        Some(ApprovalState::Approved)
    );
}

#[tokio::test]
async fn rejected_proposal_blocks_the_write() {
    let mut h = Harness::with(ScriptedAuditor::with_verdicts(&[false]), Arc::new(NoopLinter)).await;
    h.write("src/a.ts", VULNERABLE);

    let proposal = h
        .call("propose_fix", json!({"path": "src/a.ts", "code": FIXED}))
        .await;
    assert_eq!(proposal.failure, Some(FailureKind::Rejected));

    let write = h
        .call("write_fix", json!({"path": "src/a.ts", "code": FIXED}))
        .await;
    assert_eq!(write.failure, Some(FailureKind::ApprovalRequired));
    assert_eq!(h.read("src/a.ts"), VULNERABLE);

    // A fresh proposal that passes review reopens the path.
    let retry = h
        .call("propose_fix", json!({"path": "src/a.ts", "code": FIXED}))
        .await;
    assert!(retry.success);
    let write = h
        .call("write_fix", json!({"path": "./src/a.ts", "code": FIXED}))
        .await;
    assert!(write.success, "{}", write.render());
}

#[tokio::test]
async fn write_must_carry_the_reviewed_content() {
    let mut h = project().await;
    h.call("propose_fix", json!({"path": "src/a.ts", "code": FIXED}))
        .await;

    let swapped = h
        .call(
            "write_fix",
            json!({"path": "src/a.ts", "code": format!("{FIXED}// and something unreviewed\n")}),
        )
        .await;
    assert_eq!(swapped.failure, Some(FailureKind::ApprovalRequired));
    assert_eq!(h.read("src/a.ts"), VULNERABLE);

    let honest = h
        .call("write_fix", json!({"path": "src/a.ts", "code": FIXED}))
        .await;
    assert!(honest.success);
}

#[tokio::test]
async fn approval_saves_a_checkpoint_the_model_can_load() {
    let mut h = project().await;
    h.call("propose_fix", json!({"path": "src/a.ts", "code": FIXED}))
        .await;

    let loaded = h
        .call("checkpoint_manager", json!({"action": "load", "path": "src/a.ts"}))
        .await;
    assert!(loaded.success);
    assert!(loaded.output.contains("CHECKPOINT [src/a.ts]"));
}

#[tokio::test]
async fn auditor_sees_current_and_proposed_content() {
    let auditor = ScriptedAuditor::approving();
    let mut h = Harness::with(auditor.clone(), Arc::new(NoopLinter)).await;
    h.write("src/a.ts", VULNERABLE);

    h.call("propose_fix", json!({"path": "src/a.ts", "code": FIXED}))
        .await;

    let requests = auditor.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "src/a.ts");
    assert_eq!(requests[0].proposed, FIXED);
    assert_eq!(requests[0].current.as_deref(), Some(VULNERABLE));
}
