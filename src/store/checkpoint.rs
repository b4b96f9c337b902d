use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use strum::{Display, EnumString};

use crate::error::StoreError;

/// Who produced a checkpoint's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CheckpointOrigin {
    /// Saved by the approval gate when the auditor approved a proposal.
    Approved,
    /// Saved directly by the agent through `checkpoint_manager`, never reviewed.
    Agent,
}

/// Last saved content for one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    pub path: String,
    pub content: String,
    pub origin: CheckpointOrigin,
    pub saved_at: String,
}

impl Checkpoint {
    pub fn is_reviewed(&self) -> bool {
        self.origin == CheckpointOrigin::Approved
    }
}

type CheckpointRow = (String, String, String, String);

fn from_row((path, content, origin, saved_at): CheckpointRow) -> Result<Checkpoint> {
    let origin = CheckpointOrigin::from_str(&origin).map_err(|_| StoreError::Decode {
        kind: "checkpoint origin",
        value: origin.clone(),
    })?;
    Ok(Checkpoint {
        path,
        content,
        origin,
        saved_at,
    })
}

/// Path-keyed, last-write-wins store of known-good file contents.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    pool: SqlitePool,
}

impl CheckpointStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Overwrite any prior checkpoint for `path` with reviewed content.
    pub async fn save(&self, path: &str, content: &str) -> Result<()> {
        self.save_as(path, content, CheckpointOrigin::Approved).await
    }

    /// Overwrite any prior checkpoint for `path`, recording who produced it.
    pub async fn save_as(&self, path: &str, content: &str, origin: CheckpointOrigin) -> Result<()> {
        sqlx::query(
            "INSERT INTO checkpoints (path, content, origin, saved_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT(path) DO UPDATE SET content = excluded.content,
                 origin = excluded.origin, saved_at = excluded.saved_at",
        )
        .bind(path)
        .bind(content)
        .bind(origin.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("save checkpoint for {path}"))?;
        Ok(())
    }

    pub async fn load(&self, path: &str) -> Result<Option<String>> {
        Ok(self.get(path).await?.map(|c| c.content))
    }

    pub async fn get(&self, path: &str) -> Result<Option<Checkpoint>> {
        let row: Option<CheckpointRow> = sqlx::query_as(
            "SELECT path, content, origin, saved_at FROM checkpoints WHERE path = $1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("load checkpoint for {path}"))?;

        row.map(from_row).transpose()
    }

    /// All checkpointed paths, most recently saved first.
    pub async fn list(&self) -> Result<Vec<Checkpoint>> {
        let rows: Vec<CheckpointRow> = sqlx::query_as(
            "SELECT path, content, origin, saved_at FROM checkpoints ORDER BY saved_at DESC, path",
        )
        .fetch_all(&self.pool)
        .await
        .context("list checkpoints")?;

        rows.into_iter().map(from_row).collect()
    }

    /// Remove every checkpoint. Only called at session start.
    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM checkpoints")
            .execute(&self.pool)
            .await
            .context("clear checkpoints")?;
        Ok(())
    }
}
