mod git;

pub use git::GitCli;

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

/// What to publish after a successful session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub branch: String,
    pub message: String,
    pub title: String,
    pub body: String,
    pub open_pr: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub branch: String,
    pub pr_url: Option<String>,
}

/// Version-control collaborator. Only invoked at terminal states, never mid-loop.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Discard every uncommitted change under `root`.
    async fn rollback(&self, root: &Path) -> anyhow::Result<()>;

    /// Branch, commit, push and optionally open a pull request.
    async fn publish(&self, root: &Path, request: &PublishRequest)
    -> anyhow::Result<PublishOutcome>;
}
