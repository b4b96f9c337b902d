use anyhow::{Context, Result};
use sqlx::sqlite::SqlitePool;

const STORE_SCHEMA_META_TABLE: &str = "
CREATE TABLE IF NOT EXISTS store_schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";
const STORE_SCHEMA_VERSION_KEY: &str = "store_schema_version";
const STORE_SCHEMA_VERSION: u32 = 2;

const AUDIT_TABLE: &str = "
CREATE TABLE IF NOT EXISTS audit_log (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    path           TEXT NOT NULL,
    action         TEXT NOT NULL,
    status         TEXT NOT NULL,
    output         TEXT NOT NULL DEFAULT '',
    content_digest TEXT,
    session_id     TEXT,
    timestamp      TEXT NOT NULL
)";

// Rows are never rewritten once recorded.
const AUDIT_NO_UPDATE_TRIGGER: &str = "
CREATE TRIGGER IF NOT EXISTS audit_log_no_update
BEFORE UPDATE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit_log is append-only');
END";

// Only `AuditLog::clear` lifts this, inside one transaction.
pub(super) const AUDIT_NO_DELETE_TRIGGER: &str = "
CREATE TRIGGER IF NOT EXISTS audit_log_no_delete
BEFORE DELETE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit_log is append-only');
END";
pub(super) const DROP_AUDIT_NO_DELETE_TRIGGER: &str = "DROP TRIGGER IF EXISTS audit_log_no_delete";

const AUDIT_STATUS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_audit_log_status ON audit_log(status, id)";
const AUDIT_PATH_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_audit_log_path ON audit_log(path, id)";

const CHECKPOINT_TABLE: &str = "
CREATE TABLE IF NOT EXISTS checkpoints (
    path     TEXT PRIMARY KEY,
    content  TEXT NOT NULL,
    origin   TEXT NOT NULL DEFAULT 'approved',
    saved_at TEXT NOT NULL
)";

async fn ensure_schema_version(pool: &SqlitePool) -> Result<()> {
    sqlx::query(STORE_SCHEMA_META_TABLE)
        .execute(pool)
        .await
        .context("create store_schema_meta table")?;

    let stored_version: Option<(String,)> =
        sqlx::query_as("SELECT value FROM store_schema_meta WHERE key = $1")
            .bind(STORE_SCHEMA_VERSION_KEY)
            .fetch_optional(pool)
            .await
            .context("load store schema version")?;

    if let Some((value,)) = stored_version {
        let parsed = value
            .parse::<u32>()
            .with_context(|| format!("invalid store schema version value: {value}"))?;
        anyhow::ensure!(
            parsed == STORE_SCHEMA_VERSION,
            "incompatible store schema version: stored={parsed}, expected={STORE_SCHEMA_VERSION}. \
remove the audit database and restart."
        );
        return Ok(());
    }

    sqlx::query("INSERT INTO store_schema_meta (key, value) VALUES ($1, $2)")
        .bind(STORE_SCHEMA_VERSION_KEY)
        .bind(STORE_SCHEMA_VERSION.to_string())
        .execute(pool)
        .await
        .context("persist store schema version")?;

    Ok(())
}

/// Create tables, indexes, and the append-only triggers if they do not exist.
pub(super) async fn migrate(pool: &SqlitePool) -> Result<()> {
    ensure_schema_version(pool).await?;

    for (statement, what) in [
        (AUDIT_TABLE, "create audit_log table"),
        (AUDIT_NO_UPDATE_TRIGGER, "create audit_log update trigger"),
        (AUDIT_NO_DELETE_TRIGGER, "create audit_log delete trigger"),
        (AUDIT_STATUS_INDEX, "create audit_log status index"),
        (AUDIT_PATH_INDEX, "create audit_log path index"),
        (CHECKPOINT_TABLE, "create checkpoints table"),
    ] {
        sqlx::query(statement).execute(pool).await.context(what)?;
    }

    Ok(())
}
