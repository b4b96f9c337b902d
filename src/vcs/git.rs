use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use super::{PublishOutcome, PublishRequest, VersionControl};
use crate::config::VcsConfig;
use crate::error::WardenError;

const GIT_TIMEOUT_SECS: u64 = 120;

/// `git` and `gh` driven as subprocesses.
#[derive(Debug, Clone)]
pub struct GitCli {
    remote: String,
    base_branch: String,
    timeout: Duration,
}

impl GitCli {
    pub fn new(remote: impl Into<String>, base_branch: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            base_branch: base_branch.into(),
            timeout: Duration::from_secs(GIT_TIMEOUT_SECS),
        }
    }

    pub fn from_config(config: &VcsConfig) -> Self {
        Self::new(config.remote.clone(), config.base_branch.clone())
    }

    async fn run(&self, root: &Path, program: &str, args: &[&str]) -> Result<String, WardenError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(root)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let describe = || format!("{program} {}", args.join(" "));
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| WardenError::Vcs(format!("`{}` timed out", describe())))?
            .map_err(|e| WardenError::Vcs(format!("failed to run `{}`: {e}", describe())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WardenError::Vcs(format!(
                "`{}` failed: {}",
                describe(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn publish_steps(
        &self,
        root: &Path,
        request: &PublishRequest,
    ) -> Result<PublishOutcome, WardenError> {
        self.run(root, "git", &["checkout", "-b", &request.branch])
            .await?;
        self.run(root, "git", &["add", "-A"]).await?;
        self.run(root, "git", &["commit", "-m", &request.message])
            .await?;
        self.run(root, "git", &["push", "-u", &self.remote, &request.branch])
            .await?;

        let pr_url = if request.open_pr {
            let url = self
                .run(
                    root,
                    "gh",
                    &[
                        "pr",
                        "create",
                        "--title",
                        &request.title,
                        "--body",
                        &request.body,
                        "--base",
                        &self.base_branch,
                        "--head",
                        &request.branch,
                    ],
                )
                .await?;
            Some(url)
        } else {
            None
        };

        Ok(PublishOutcome {
            branch: request.branch.clone(),
            pr_url,
        })
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn rollback(&self, root: &Path) -> anyhow::Result<()> {
        self.run(root, "git", &["reset", "--hard", "HEAD"]).await?;
        self.run(root, "git", &["clean", "-fd"]).await?;
        info!(root = %root.display(), "rolled back uncommitted changes");
        Ok(())
    }

    async fn publish(
        &self,
        root: &Path,
        request: &PublishRequest,
    ) -> anyhow::Result<PublishOutcome> {
        match self.publish_steps(root, request).await {
            Ok(outcome) => {
                info!(branch = %outcome.branch, pr = ?outcome.pr_url, "published remediation");
                Ok(outcome)
            }
            Err(e) => {
                warn!(branch = %request.branch, "publish failed, returning to {}: {e}", self.base_branch);
                if let Err(back) = self
                    .run(root, "git", &["checkout", &self.base_branch])
                    .await
                {
                    warn!("could not return to base branch: {back}");
                }
                Err(e.into())
            }
        }
    }
}
