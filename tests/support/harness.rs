#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use patchwarden::Config;
use patchwarden::core::SessionContext;
use patchwarden::core::providers::{Message, ModelTurn, Provider, ToolCall};
use patchwarden::core::tools::{ToolRegistry, ToolResult, ToolSpec, remediation_tools};
use patchwarden::security::{Auditor, ReviewRequest, SandboxPolicy, SandboxRoot, Verdict};
use patchwarden::store::Store;
use patchwarden::vcs::{PublishOutcome, PublishRequest, VersionControl};
use patchwarden::verify::{LintReport, Linter, NoopLinter};
use tempfile::TempDir;

pub const MEMORY_PREFIX: &str = ".agent_memory";

/// Model collaborator that replays scripted turns and remembers what it was shown.
pub struct MockProvider {
    turns: Mutex<VecDeque<anyhow::Result<ModelTurn>>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl MockProvider {
    pub fn new(turns: Vec<ModelTurn>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into_iter().map(Ok).collect()),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn last_transcript(&self) -> Vec<Message> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        transcript: &[Message],
        _tools: &[ToolSpec],
    ) -> anyhow::Result<ModelTurn> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(transcript.to_vec());
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok(ModelTurn::text("working on it")))
    }
}

/// Auditor that replays verdicts (approving once the script runs out) and records requests.
#[derive(Default)]
pub struct ScriptedAuditor {
    verdicts: Mutex<VecDeque<bool>>,
    requests: Mutex<Vec<ReviewRequest>>,
}

impl ScriptedAuditor {
    pub fn approving() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_verdicts(verdicts: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            verdicts: Mutex::new(verdicts.iter().copied().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ReviewRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Auditor for ScriptedAuditor {
    async fn review(&self, request: &ReviewRequest) -> anyhow::Result<Verdict> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let approve = self
            .verdicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(true);
        Ok(if approve {
            Verdict::approved("addresses the vulnerability")
        } else {
            Verdict::rejected("still concatenates user input")
        })
    }
}

/// Linter that returns a fixed report, or fails outright.
pub struct ScriptedLinter {
    report: Option<LintReport>,
}

impl ScriptedLinter {
    pub fn reporting(report: LintReport) -> Arc<Self> {
        Arc::new(Self {
            report: Some(report),
        })
    }

    pub fn crashing() -> Arc<Self> {
        Arc::new(Self { report: None })
    }
}

#[async_trait]
impl Linter for ScriptedLinter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn lint(&self, _path: &Path, _root: &Path) -> anyhow::Result<LintReport> {
        self.report
            .clone()
            .ok_or_else(|| anyhow::anyhow!("linter binary vanished"))
    }
}

#[derive(Default)]
pub struct RecordingVcs {
    rollbacks: Mutex<Vec<PathBuf>>,
    published: Mutex<Vec<PublishRequest>>,
}

impl RecordingVcs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rollbacks(&self) -> Vec<PathBuf> {
        self.rollbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl VersionControl for RecordingVcs {
    async fn rollback(&self, root: &Path) -> anyhow::Result<()> {
        self.rollbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(root.to_path_buf());
        Ok(())
    }

    async fn publish(
        &self,
        _root: &Path,
        request: &PublishRequest,
    ) -> anyhow::Result<PublishOutcome> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        Ok(PublishOutcome {
            branch: request.branch.clone(),
            pr_url: None,
        })
    }
}

/// A project root and a memory root under one temp dir, an in-memory store, and the
/// full remediation tool surface.
pub struct Harness {
    pub dir: TempDir,
    pub project: PathBuf,
    pub memory: PathBuf,
    pub store: Store,
    pub ctx: SessionContext,
    pub registry: ToolRegistry,
    next_call: u32,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with(ScriptedAuditor::approving(), Arc::new(NoopLinter)).await
    }

    pub async fn with(auditor: Arc<dyn Auditor>, linter: Arc<dyn Linter>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let project = base.join("project");
        let memory = base.join("memory");
        std::fs::create_dir_all(project.join("src")).unwrap();
        std::fs::create_dir_all(&memory).unwrap();

        let defaults = Config::default();
        let policy = SandboxPolicy::new(
            vec![
                SandboxRoot::new("project", &project),
                SandboxRoot::new("memory", &memory).with_prefix(MEMORY_PREFIX),
            ],
            defaults.sandbox.restricted_paths,
            defaults.commands.allowed_prefixes,
        )
        .unwrap();
        let store = Store::in_memory().await.unwrap();
        let ctx = SessionContext::new(policy, &store, auditor, linter);

        Self {
            dir,
            project,
            memory,
            store,
            ctx,
            registry: remediation_tools(),
            next_call: 0,
        }
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.project.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.project.join(relative)).unwrap()
    }

    /// Dispatch one tool call the way the kernel does.
    pub async fn call(&mut self, tool: &str, args: serde_json::Value) -> ToolResult {
        self.next_call += 1;
        let call = ToolCall::new(format!("call_{}", self.next_call), tool, args.to_string());
        self.registry.dispatch(&call, &mut self.ctx).await.unwrap()
    }
}

pub fn call(id: &str, tool: &str, args: serde_json::Value) -> ToolCall {
    ToolCall::new(id, tool, args.to_string())
}
