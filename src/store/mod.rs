//! Durable session state: the append-only audit log and the path-keyed checkpoint store.
//!
//! Both live in one SQLite database. A session is the single writer, so the pool
//! is kept small.

mod audit;
mod checkpoint;
mod schema;

pub use audit::{AuditAction, AuditEntry, AuditLog, AuditStatus, NewAuditEntry};
pub use checkpoint::{Checkpoint, CheckpointOrigin, CheckpointStore};

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

/// Handle to the audit database.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database file at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create store directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .with_context(|| format!("open audit database {}", path.display()))?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database. One connection, so every query sees the same data.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("open in-memory audit database")?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and run migrations.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        schema::migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub fn audit(&self) -> AuditLog {
        AuditLog::new(self.pool.clone())
    }

    pub fn checkpoints(&self) -> CheckpointStore {
        CheckpointStore::new(self.pool.clone())
    }

    /// Clear audit entries and checkpoints. Only called at session start.
    pub async fn reset(&self) -> Result<()> {
        self.audit().clear().await?;
        self.checkpoints().clear().await?;
        Ok(())
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
