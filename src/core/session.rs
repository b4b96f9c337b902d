use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::core::agent::scratchpad::Scratchpad;
use crate::core::agent::transcript::Transcript;
use crate::core::tools::knowledge::KnowledgeBase;
use crate::security::{ApprovalGate, Auditor, CommandLimits, SandboxPolicy, WriteGuard};
use crate::store::{AuditLog, CheckpointStore, NewAuditEntry, Store};
use crate::verify::Linter;

/// Everything one remediation session owns. Built once, passed to every component,
/// and torn down with [`SessionContext::end`].
pub struct SessionContext {
    pub id: String,
    pub policy: SandboxPolicy,
    pub approvals: ApprovalGate,
    pub audit: AuditLog,
    pub checkpoints: CheckpointStore,
    pub auditor: Arc<dyn Auditor>,
    pub linter: Arc<dyn Linter>,
    pub write_guard: WriteGuard,
    pub limits: CommandLimits,
    pub ignored_entries: Vec<String>,
    /// Test command run through the command gate after a clean lint
    pub post_write_test: Option<String>,
    pub knowledge: KnowledgeBase,
    /// Latest lint/test failure text, handed to the auditor with the next proposal
    pub evidence: Option<String>,
    pub transcript: Transcript,
    pub max_steps: u32,
    pub termination_signal: String,
    pub scratchpad: Option<Scratchpad>,
}

impl SessionContext {
    /// Session with default guard, limits, and budget. Tests and embedders adjust fields directly.
    pub fn new(
        policy: SandboxPolicy,
        store: &Store,
        auditor: Arc<dyn Auditor>,
        linter: Arc<dyn Linter>,
    ) -> Self {
        let defaults = Config::default();
        let scratchpad = policy.memory_root().map(Scratchpad::new);
        Self {
            id: Uuid::new_v4().to_string(),
            policy,
            approvals: ApprovalGate::new(),
            audit: store.audit(),
            checkpoints: store.checkpoints(),
            auditor,
            linter,
            write_guard: WriteGuard::default(),
            limits: CommandLimits::default(),
            ignored_entries: defaults.sandbox.ignored_entries,
            post_write_test: None,
            knowledge: KnowledgeBase::empty(),
            evidence: None,
            transcript: Transcript::new(),
            max_steps: defaults.kernel.max_steps,
            termination_signal: defaults.kernel.termination_signal,
            scratchpad,
        }
    }

    /// Build the session described by `config`, clearing the store first when configured to.
    pub async fn from_config(
        config: &Config,
        store: &Store,
        auditor: Arc<dyn Auditor>,
        linter: Arc<dyn Linter>,
    ) -> anyhow::Result<Self> {
        let project_root = config.project_root()?;
        let memory_root = config.memory_root()?;
        if let Some(memory) = &memory_root {
            std::fs::create_dir_all(memory)
                .with_context(|| format!("create memory root {}", memory.display()))?;
        }
        let policy = SandboxPolicy::from_config(
            &config.sandbox,
            &config.commands,
            &project_root,
            memory_root.as_deref(),
        )?;

        if config.store.reset_on_session_start {
            store.reset().await.context("reset audit log and checkpoints")?;
            info!("cleared audit log and checkpoints at session start");
        }

        let knowledge = match config.knowledge_path()? {
            Some(path) => KnowledgeBase::load(&path)?,
            None => KnowledgeBase::empty(),
        };

        let mut ctx = Self::new(policy, store, auditor, linter);
        ctx.write_guard = WriteGuard::from_config(&config.write_guard);
        ctx.limits = CommandLimits {
            timeout: Duration::from_secs(config.commands.timeout_secs),
            max_output_bytes: config.commands.max_output_bytes,
        };
        ctx.ignored_entries.clone_from(&config.sandbox.ignored_entries);
        ctx.post_write_test.clone_from(&config.verify.post_write_test);
        ctx.knowledge = knowledge;
        ctx.max_steps = config.kernel.max_steps;
        ctx.termination_signal.clone_from(&config.kernel.termination_signal);

        info!(
            session = %ctx.id,
            project = %ctx.policy.project_root().display(),
            knowledge_entries = ctx.knowledge.len(),
            "session context ready"
        );
        Ok(ctx)
    }

    /// Append an audit entry tagged with this session's id.
    pub async fn audit(&self, entry: NewAuditEntry) -> anyhow::Result<i64> {
        self.audit.record(&entry.session(self.id.clone())).await
    }

    /// Audit without failing the caller; used where the primary outcome is already decided.
    pub async fn audit_quietly(&self, entry: NewAuditEntry) {
        if let Err(e) = self.audit(entry).await {
            warn!(session = %self.id, "failed to record audit entry: {e:#}");
        }
    }

    /// Drop per-session state. The audit log and checkpoints persist.
    pub fn end(&mut self) {
        self.approvals.clear();
        self.evidence = None;
        info!(session = %self.id, messages = self.transcript.len(), "session ended");
    }
}
