use patchwarden::store::{AuditAction, AuditStatus, NewAuditEntry, Store};

async fn record(store: &Store, path: &str, status: AuditStatus) -> i64 {
    store
        .audit()
        .record(&NewAuditEntry::new(path, AuditAction::WriteSrc, status).output(path))
        .await
        .unwrap()
}

#[tokio::test]
async fn audit_log_only_grows_and_queries_newest_first() {
    let store = Store::in_memory().await.unwrap();
    let log = store.audit();

    let mut ids = Vec::new();
    for (i, status) in [
        AuditStatus::Success,
        AuditStatus::LintError,
        AuditStatus::Success,
        AuditStatus::Rejected,
    ]
    .into_iter()
    .enumerate()
    {
        ids.push(record(&store, &format!("src/{i}.ts"), status).await);
        assert_eq!(log.count().await.unwrap(), i64::try_from(i + 1).unwrap());
    }
    let snapshot = log.query(100, None).await.unwrap();

    let latest = log.query(2, None).await.unwrap();
    assert_eq!(
        latest.iter().map(|e| e.id).collect::<Vec<_>>(),
        vec![ids[3], ids[2]]
    );

    record(&store, "src/later.ts", AuditStatus::Success).await;
    let after = log.query(100, None).await.unwrap();
    assert_eq!(after.len(), snapshot.len() + 1);
    assert_eq!(&after[1..], snapshot.as_slice());

    let successes = log.query(10, Some(AuditStatus::Success)).await.unwrap();
    assert_eq!(successes.len(), 3);
    assert!(successes.windows(2).all(|w| w[0].id > w[1].id));
}

#[tokio::test]
async fn audit_rows_cannot_be_updated() {
    let store = Store::in_memory().await.unwrap();
    let id = record(&store, "src/a.ts", AuditStatus::Success).await;

    let tamper = sqlx::query("UPDATE audit_log SET status = 'rejected' WHERE id = $1")
        .bind(id)
        .execute(store.pool())
        .await;
    assert!(tamper.is_err());

    let entries = store.audit().query(1, None).await.unwrap();
    assert_eq!(entries[0].status, AuditStatus::Success);
}

#[tokio::test]
async fn audit_rows_cannot_be_deleted_outside_a_reset() {
    let store = Store::in_memory().await.unwrap();
    record(&store, "src/a.ts", AuditStatus::Success).await;

    let tamper = sqlx::query("DELETE FROM audit_log")
        .execute(store.pool())
        .await;
    assert!(tamper.is_err());
    assert_eq!(store.audit().count().await.unwrap(), 1);

    store.reset().await.unwrap();
    assert_eq!(store.audit().count().await.unwrap(), 0);

    // The reset leaves the protection in place.
    record(&store, "src/b.ts", AuditStatus::Success).await;
    let tamper = sqlx::query("DELETE FROM audit_log")
        .execute(store.pool())
        .await;
    assert!(tamper.is_err());
    assert_eq!(store.audit().count().await.unwrap(), 1);
}

#[tokio::test]
async fn checkpoints_are_last_write_wins() {
    let store = Store::in_memory().await.unwrap();
    let checkpoints = store.checkpoints();

    assert_eq!(checkpoints.load("src/a.ts").await.unwrap(), None);
    checkpoints.save("src/a.ts", "first").await.unwrap();
    assert_eq!(
        checkpoints.load("src/a.ts").await.unwrap().as_deref(),
        Some("first")
    );
    checkpoints.save("src/a.ts", "second").await.unwrap();
    assert_eq!(
        checkpoints.load("src/a.ts").await.unwrap().as_deref(),
        Some("second")
    );
    assert_eq!(checkpoints.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn file_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("nested/patchwarden.db");

    let store = Store::open(&db).await.unwrap();
    record(&store, "src/a.ts", AuditStatus::Success).await;
    store.checkpoints().save("src/a.ts", "kept").await.unwrap();
    store.pool().close().await;

    let reopened = Store::open(&db).await.unwrap();
    assert_eq!(reopened.audit().count().await.unwrap(), 1);
    assert_eq!(
        reopened.checkpoints().load("src/a.ts").await.unwrap().as_deref(),
        Some("kept")
    );
}
