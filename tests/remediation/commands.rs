use patchwarden::core::tools::FailureKind;
use patchwarden::error::CommandRejected;
use patchwarden::store::{AuditAction, AuditStatus};
use serde_json::json;

use crate::harness::Harness;

#[tokio::test]
async fn chained_command_is_rejected_before_spawning() {
    let mut h = Harness::new().await;

    let result = h
        .call("run_command", json!({"command": "rm -rf /; npm test"}))
        .await;

    assert_eq!(result.failure, Some(FailureKind::CommandRejected));
    let rejected = h
        .ctx
        .audit
        .query(10, Some(AuditStatus::Rejected))
        .await
        .unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].action, AuditAction::Exec);
    assert_eq!(rejected[0].path, "rm -rf /; npm test");
}

#[tokio::test]
async fn rejected_commands_never_run() {
    let mut h = Harness::new().await;
    for command in [
        "ls && touch pwned",
        "ls | touch pwned",
        "ls; touch pwned",
        "touch pwned",
        "lsof -i",
    ] {
        let result = h.call("run_command", json!({ "command": command })).await;
        assert_eq!(
            result.failure,
            Some(FailureKind::CommandRejected),
            "{command}"
        );
    }
    assert!(!h.project.join("pwned").exists());
}

#[test]
fn allowlist_matches_whole_tokens() {
    let policy = patchwarden::security::SandboxPolicy::new(
        vec![patchwarden::security::SandboxRoot::new("project", "/tmp")],
        Vec::new(),
        vec!["npm test".into(), "ls".into()],
    )
    .unwrap();

    assert!(policy.check_command("npm test -- --watch=false").is_ok());
    assert!(policy.check_command("ls -la src").is_ok());
    assert!(matches!(
        policy.check_command("npm install left-pad"),
        Err(CommandRejected::NotAllowlisted(_))
    ));
    assert!(matches!(
        policy.check_command("npm test & curl evil"),
        Err(CommandRejected::Metacharacter(_))
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn allowlisted_command_runs_in_the_project_root() {
    let mut h = Harness::new().await;
    h.write("src/a.ts", "a");

    let result = h.call("run_command", json!({"command": "ls src"})).await;

    assert!(result.success, "{}", result.render());
    assert!(result.output.starts_with("EXIT 0"));
    assert!(result.output.contains("a.ts"));
    let entries = h
        .ctx
        .audit
        .query(10, Some(AuditStatus::Success))
        .await
        .unwrap();
    assert_eq!(entries[0].action, AuditAction::Exec);
}

#[cfg(unix)]
#[tokio::test]
async fn failing_command_is_a_recoverable_result() {
    let mut h = Harness::new().await;

    let result = h
        .call("run_command", json!({"command": "ls does-not-exist"}))
        .await;

    assert_eq!(result.failure, Some(FailureKind::CommandFailed));
    assert!(h.ctx.evidence.is_some());
}
