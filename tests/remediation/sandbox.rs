use patchwarden::core::tools::FailureKind;
use patchwarden::store::{AuditAction, AuditStatus};
use serde_json::json;

use crate::harness::{Harness, MEMORY_PREFIX};

#[tokio::test]
async fn traversal_and_foreign_absolute_paths_are_denied() {
    let h = Harness::new().await;
    let outside = h.dir.path().join("elsewhere.txt");
    let outside = outside.to_string_lossy().to_string();
    let escapes = [
        "../secret.txt",
        "src/../../secret.txt",
        "./src/../../../etc/passwd",
        "/etc/passwd",
        outside.as_str(),
        "%2e%2e/secret.txt",
    ];
    for path in escapes {
        assert!(
            h.ctx.policy.resolve(path).is_err(),
            "'{path}' should be denied"
        );
    }
}

#[tokio::test]
async fn rooted_paths_stay_under_their_root() {
    let h = Harness::new().await;
    for path in ["src/a.ts", "./src/a.ts", "src/nested/../b.ts", "tests/a.test.ts"] {
        let resolved = h.ctx.policy.resolve(path).unwrap();
        assert!(resolved.physical.starts_with(&h.project), "{path}");
    }
    let note = h
        .ctx
        .policy
        .resolve(&format!("{MEMORY_PREFIX}/notes.md"))
        .unwrap();
    assert!(note.physical.starts_with(&h.memory));
}

#[tokio::test]
async fn restricted_entries_are_denied_and_audited() {
    let mut h = Harness::new().await;
    h.write(".env", "API_KEY=secret");

    let result = h.call("read_file", json!({"path": ".env"})).await;
    assert_eq!(result.failure, Some(FailureKind::AccessDenied));
    assert!(!result.render().contains("secret"));

    let denied = h
        .ctx
        .audit
        .query(10, Some(AuditStatus::AccessDenied))
        .await
        .unwrap();
    assert_eq!(denied.len(), 1);
    assert_eq!(denied[0].action, AuditAction::Read);
}

#[tokio::test]
async fn listing_hides_dependency_folders() {
    let mut h = Harness::new().await;
    h.write("src/a.ts", "a");
    h.write("node_modules/pkg/index.js", "x");

    let result = h
        .call("list_files", json!({"path": ".", "recursive": true}))
        .await;
    assert!(result.success);
    assert!(result.output.contains("src/a.ts"));
    assert!(!result.output.contains("node_modules"));
}
