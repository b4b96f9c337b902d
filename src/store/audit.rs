use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use strum::{Display, EnumString};

use super::schema::{AUDIT_NO_DELETE_TRIGGER, DROP_AUDIT_NO_DELETE_TRIGGER};
use crate::error::StoreError;

/// What kind of tool invocation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    WriteSrc,
    WriteTest,
    Exec,
    Read,
    Propose,
    Checkpoint,
}

/// Outcome of the recorded invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    LintError,
    ValidationFailed,
    CommandError,
    AccessDenied,
    Rejected,
    NotFound,
}

/// An entry about to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEntry {
    pub path: String,
    pub action: AuditAction,
    pub status: AuditStatus,
    pub output: String,
    pub content_digest: Option<String>,
    pub session_id: Option<String>,
}

impl NewAuditEntry {
    pub fn new(path: impl Into<String>, action: AuditAction, status: AuditStatus) -> Self {
        Self {
            path: path.into(),
            action,
            status,
            output: String::new(),
            content_digest: None,
            session_id: None,
        }
    }

    pub fn output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn digest(mut self, digest: impl Into<String>) -> Self {
        self.content_digest = Some(digest.into());
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// A recorded entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub path: String,
    pub action: AuditAction,
    pub status: AuditStatus,
    pub output: String,
    pub content_digest: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: String,
}

/// Append-only record of every tool invocation.
#[derive(Debug, Clone)]
pub struct AuditLog {
    pool: SqlitePool,
}

fn decode<T: FromStr>(kind: &'static str, value: String) -> Result<T> {
    T::from_str(&value).map_err(|_| StoreError::Decode { kind, value }.into())
}

fn map_audit_row(row: &SqliteRow) -> Result<AuditEntry> {
    Ok(AuditEntry {
        id: row.try_get("id")?,
        path: row.try_get("path")?,
        action: decode("action", row.try_get("action")?)?,
        status: decode("status", row.try_get("status")?)?,
        output: row.try_get("output")?,
        content_digest: row.try_get("content_digest")?,
        session_id: row.try_get("session_id")?,
        timestamp: row.try_get("timestamp")?,
    })
}

impl AuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append an entry; returns its id.
    pub async fn record(&self, entry: &NewAuditEntry) -> Result<i64> {
        let timestamp = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO audit_log (path, action, status, output, content_digest, session_id, timestamp)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&entry.path)
        .bind(entry.action.to_string())
        .bind(entry.status.to_string())
        .bind(&entry.output)
        .bind(&entry.content_digest)
        .bind(&entry.session_id)
        .bind(&timestamp)
        .execute(&self.pool)
        .await
        .context("insert audit entry")?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent entries first, optionally filtered by status.
    pub async fn query(&self, limit: u32, status: Option<AuditStatus>) -> Result<Vec<AuditEntry>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(
                    "SELECT id, path, action, status, output, content_digest, session_id, timestamp
                     FROM audit_log
                     WHERE status = $1
                     ORDER BY id DESC
                     LIMIT $2",
                )
                .bind(status.to_string())
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id, path, action, status, output, content_digest, session_id, timestamp
                     FROM audit_log
                     ORDER BY id DESC
                     LIMIT $1",
                )
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("query audit log")?;

        rows.iter().map(map_audit_row).collect()
    }

    /// Most recent entries for one path.
    pub async fn query_path(&self, path: &str, limit: u32) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, path, action, status, output, content_digest, session_id, timestamp
             FROM audit_log
             WHERE path = $1
             ORDER BY id DESC
             LIMIT $2",
        )
        .bind(path)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .context("query audit log by path")?;

        rows.iter().map(map_audit_row).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM audit_log")
            .fetch_one(&self.pool)
            .await
            .context("count audit entries")?;
        Ok(count)
    }

    /// Remove every entry. Only called at session start.
    ///
    /// The delete trigger is dropped and recreated in the same transaction, so no other
    /// statement can delete rows.
    pub async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.context("begin audit log clear")?;
        for (statement, what) in [
            (DROP_AUDIT_NO_DELETE_TRIGGER, "lift audit_log delete trigger"),
            ("DELETE FROM audit_log", "clear audit log"),
            (AUDIT_NO_DELETE_TRIGGER, "restore audit_log delete trigger"),
        ] {
            sqlx::query(statement).execute(&mut *tx).await.context(what)?;
        }
        tx.commit().await.context("commit audit log clear")?;
        Ok(())
    }
}
