use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{info, warn};

use super::report::{render_audit_entries, render_checkpoint_list, render_report};
use crate::cli::{CheckpointCommands, Cli, Commands};
use crate::config::Config;
use crate::core::agent::{Kernel, RemediationTask, SessionReport};
use crate::core::providers::{OpenAiCompatibleProvider, Provider};
use crate::core::session::SessionContext;
use crate::core::tools::{content_digest, remediation_tools};
use crate::security::{ModelAuditor, SandboxPolicy};
use crate::store::{AuditAction, AuditStatus, NewAuditEntry, Store};
use crate::ui::style as ui;
use crate::vcs::{GitCli, PublishRequest, VersionControl};
use crate::verify::linter_from_config;

pub async fn dispatch(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    let config = match &cli.command {
        Commands::Init { force } => return init_config(config_path, *force),
        _ => load_config(config_path)?,
    };

    match cli.command {
        Commands::Init { .. } => Ok(()),

        Commands::Run {
            target,
            vulnerability,
            details,
            commit,
            open_pr,
        } => {
            let mut task = RemediationTask::new(target, vulnerability);
            if let Some(details) = details {
                task = task.with_details(details);
            }
            run_remediation(&config, &task, commit || open_pr, open_pr).await
        }

        Commands::Audit { limit, status } => {
            let status = status
                .as_deref()
                .map(|s| AuditStatus::from_str(s).map_err(|_| anyhow!("unknown audit status '{s}'")))
                .transpose()?;
            let store = Store::open(&config.database_path()?).await?;
            let entries = store.audit().query(limit, status).await?;
            print!("{}", render_audit_entries(&entries));
            Ok(())
        }

        Commands::Checkpoint { checkpoint_command } => {
            let store = Store::open(&config.database_path()?).await?;
            match checkpoint_command {
                CheckpointCommands::Show { path: Some(path) } => {
                    let policy = sandbox_policy(&config)?;
                    let key = policy.resolve(&path)?.display_path();
                    match store.checkpoints().get(&key).await? {
                        Some(checkpoint) => {
                            println!(
                                "{}",
                                ui::dim(format!(
                                    "{} {} saved {}",
                                    key, checkpoint.origin, checkpoint.saved_at
                                ))
                            );
                            print!("{}", checkpoint.content);
                        }
                        None => println!("No checkpoint for {key}."),
                    }
                }
                CheckpointCommands::Show { path: None } => {
                    print!("{}", render_checkpoint_list(&store.checkpoints().list().await?));
                }
                CheckpointCommands::Restore { path, unreviewed } => {
                    let policy = sandbox_policy(&config)?;
                    let written = restore_checkpoint(&policy, &store, &path, unreviewed).await?;
                    println!("{} restored {written}", ui::success("✓"));
                }
            }
            Ok(())
        }

        Commands::Rollback => {
            let root = config.project_root()?;
            GitCli::from_config(&config.vcs).rollback(&root).await?;
            println!("{} rolled back {}", ui::success("✓"), root.display());
            Ok(())
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let mut config = Config::load_or_init(path)?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn init_config(path: Option<&std::path::Path>, force: bool) -> Result<()> {
    let existing = Config::load_or_init(path)?;
    if force {
        let fresh = Config {
            config_path: existing.config_path.clone(),
            ..Config::default()
        };
        fresh.save()?;
    }
    println!(
        "{} config at {}",
        ui::success("✓"),
        existing.config_path.display()
    );
    Ok(())
}

fn sandbox_policy(config: &Config) -> Result<SandboxPolicy> {
    let memory_root = config.memory_root()?;
    Ok(SandboxPolicy::from_config(
        &config.sandbox,
        &config.commands,
        &config.project_root()?,
        memory_root.as_deref(),
    )?)
}

async fn run_remediation(
    config: &Config,
    task: &RemediationTask,
    commit: bool,
    open_pr: bool,
) -> Result<()> {
    let store = Store::open(&config.database_path()?).await?;

    let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatibleProvider::from_config(&config.model));
    let auditor_provider: Arc<dyn Provider> = Arc::new(OpenAiCompatibleProvider::for_model(
        &config.model,
        config.model.auditor_model(),
    ));
    let mut auditor = ModelAuditor::new(auditor_provider);
    if let Some(instructions) = &config.prompt.auditor_instructions {
        auditor = auditor.with_instructions(instructions.clone());
    }

    let mut ctx = SessionContext::from_config(
        config,
        &store,
        Arc::new(auditor),
        linter_from_config(&config.verify),
    )
    .await?;

    let vcs = Arc::new(GitCli::from_config(&config.vcs));
    let kernel = Kernel::from_config(config, provider, remediation_tools(), vcs.clone());

    let report = kernel.run(&mut ctx, task).await;
    ctx.end();

    let mut published = None;
    let mut publish_error = None;
    if report.outcome.is_success() && commit {
        let request = publish_request(config, task, &report, open_pr);
        match vcs.publish(ctx.policy.project_root(), &request).await {
            Ok(outcome) => published = Some(outcome),
            Err(e) => {
                warn!("publish failed: {e:#}");
                publish_error = Some(e);
            }
        }
    }

    print!("{}", render_report(&report, published.as_ref()));

    if let Some(e) = publish_error {
        return Err(e.context("fix succeeded but could not be published"));
    }
    if !report.outcome.is_success() {
        bail!("remediation ended with {}", report.outcome.label());
    }
    Ok(())
}

/// Branch, commit message and pull request text for a successful session.
pub fn publish_request(
    config: &Config,
    task: &RemediationTask,
    report: &SessionReport,
    open_pr: bool,
) -> PublishRequest {
    let title = format!("fix(security): {}", task.vulnerability);
    let body = format!(
        "Automated remediation of **{}** in `{}`.\n\nSession `{}`: {} steps, {} tool calls. \
Every change was reviewed before it was written; see the audit log for details.",
        task.vulnerability, task.target, report.session_id, report.steps, report.tool_calls
    );
    PublishRequest {
        branch: format!("{}{}", config.vcs.branch_prefix, report.session_id),
        message: format!("{title}\n\nTarget: {}", task.target),
        title,
        body,
        open_pr,
    }
}

/// Operator recovery: write the stored checkpoint for `path` back to disk and audit it.
///
/// Content the agent checkpointed without review is only restored when `allow_unreviewed`.
pub async fn restore_checkpoint(
    policy: &SandboxPolicy,
    store: &Store,
    path: &str,
    allow_unreviewed: bool,
) -> Result<String> {
    let target = policy.resolve(path)?;
    policy.check_on_disk(&target)?;
    let key = target.display_path();

    let checkpoint = store
        .checkpoints()
        .get(&key)
        .await?
        .ok_or_else(|| anyhow!("no checkpoint for {key}"))?;
    if !checkpoint.is_reviewed() && !allow_unreviewed {
        bail!(
            "checkpoint for {key} was saved by the agent without review; \
pass --unreviewed to restore it anyway"
        );
    }

    if let Some(parent) = target.physical.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&target.physical, &checkpoint.content)
        .await
        .with_context(|| format!("write {}", target.physical.display()))?;

    store
        .audit()
        .record(
            &NewAuditEntry::new(key.clone(), AuditAction::Checkpoint, AuditStatus::Success)
                .output(format!(
                    "restored {} checkpoint saved {}",
                    checkpoint.origin, checkpoint.saved_at
                ))
                .digest(content_digest(&checkpoint.content)),
        )
        .await?;
    info!(path = %key, bytes = checkpoint.content.len(), "checkpoint restored by operator");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::SandboxRoot;
    use crate::store::CheckpointOrigin;

    fn policy(root: &std::path::Path) -> SandboxPolicy {
        let defaults = Config::default();
        SandboxPolicy::new(
            vec![SandboxRoot::new("project", root)],
            defaults.sandbox.restricted_paths,
            defaults.commands.allowed_prefixes,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn restore_writes_checkpoint_and_audits() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/db.ts"), "broken").unwrap();
        let store = Store::in_memory().await.unwrap();
        store
            .checkpoints()
            .save("src/db.ts", "approved")
            .await
            .unwrap();

        let key = restore_checkpoint(&policy(&root), &store, "src/db.ts", false)
            .await
            .unwrap();

        assert_eq!(key, "src/db.ts");
        assert_eq!(
            std::fs::read_to_string(root.join("src/db.ts")).unwrap(),
            "approved"
        );
        let entries = store.audit().query(10, None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::Checkpoint);
        assert!(entries[0].content_digest.is_some());
    }

    #[tokio::test]
    async fn restore_without_checkpoint_fails() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let store = Store::in_memory().await.unwrap();
        let err = restore_checkpoint(&policy(&root), &store, "src/none.ts", false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no checkpoint"));
    }

    #[tokio::test]
    async fn restore_refuses_restricted_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let store = Store::in_memory().await.unwrap();
        assert!(
            restore_checkpoint(&policy(&root), &store, ".env", true)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn unreviewed_checkpoint_needs_explicit_consent() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/db.ts"), "current").unwrap();
        let store = Store::in_memory().await.unwrap();
        store
            .checkpoints()
            .save_as("src/db.ts", "agent copy", CheckpointOrigin::Agent)
            .await
            .unwrap();

        let err = restore_checkpoint(&policy(&root), &store, "src/db.ts", false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--unreviewed"));
        assert_eq!(
            std::fs::read_to_string(root.join("src/db.ts")).unwrap(),
            "current"
        );
        assert_eq!(store.audit().count().await.unwrap(), 0);

        restore_checkpoint(&policy(&root), &store, "src/db.ts", true)
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(root.join("src/db.ts")).unwrap(),
            "agent copy"
        );
        let entries = store.audit().query(1, None).await.unwrap();
        assert!(entries[0].output.starts_with("restored agent checkpoint"));
    }

    #[test]
    fn publish_request_uses_prefix_and_session() {
        let config = Config::default();
        let task = RemediationTask::new("src/db.ts", "SQL injection");
        let mut report = SessionReport::new("1234");
        report.steps = 3;
        let request = publish_request(&config, &task, &report, true);
        assert_eq!(request.branch, "fix/security-remediation-1234");
        assert_eq!(request.title, "fix(security): SQL injection");
        assert!(request.body.contains("src/db.ts"));
        assert!(request.open_pr);
    }
}
