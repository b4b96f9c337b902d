use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::guards::{LoopGuard, guards_from_config};
use super::kernel_types::{
    FailureReason, RemediationTask, RollbackOutcome, SessionOutcome, SessionReport,
};
use super::transcript::ToolCallRecord;
use crate::config::{Config, PromptConfig};
use crate::core::providers::{Message, Provider, ToolCall};
use crate::core::session::SessionContext;
use crate::core::tools::registry::parse_raw_arguments;
use crate::core::tools::{FailureKind, ToolRegistry, ToolResult, ToolSpec};
use crate::prompt::{SystemPromptInput, TeraEngine, build_system_prompt, build_task_prompt};
use crate::vcs::VersionControl;

const EMPTY_TURN_NUDGE: &str = "Your last reply had no tool calls and no text. \
Call a tool to continue the remediation, or reply with the completion signal if you are done.";

const SKIPPED_MESSAGE: &str = "not dispatched: the session ended in this turn";

/// Turn-sequential orchestrator: one model request at a time, tool calls dispatched in
/// emission order, loop guards consulted after every dispatch.
pub struct Kernel {
    provider: Arc<dyn Provider>,
    registry: ToolRegistry,
    guards: Vec<Box<dyn LoopGuard>>,
    vcs: Arc<dyn VersionControl>,
    prompts: PromptConfig,
    rollback_on_budget_exhausted: bool,
}

enum TurnEnd {
    Continue,
    Fatal(String),
}

impl Kernel {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: ToolRegistry,
        vcs: Arc<dyn VersionControl>,
    ) -> Self {
        Self {
            provider,
            registry,
            guards: Vec::new(),
            vcs,
            prompts: PromptConfig::default(),
            rollback_on_budget_exhausted: false,
        }
    }

    pub fn from_config(
        config: &Config,
        provider: Arc<dyn Provider>,
        registry: ToolRegistry,
        vcs: Arc<dyn VersionControl>,
    ) -> Self {
        Self::new(provider, registry, vcs)
            .with_guards(guards_from_config(&config.kernel))
            .with_prompts(config.prompt.clone())
            .with_rollback_on_budget_exhausted(config.kernel.rollback_on_budget_exhausted)
    }

    pub fn with_guards(mut self, guards: Vec<Box<dyn LoopGuard>>) -> Self {
        self.guards = guards;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptConfig) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_rollback_on_budget_exhausted(mut self, enabled: bool) -> Self {
        self.rollback_on_budget_exhausted = enabled;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Drive one remediation session to a terminal state. Never returns an error: fatal
    /// conditions end the session as a failure and trigger a rollback.
    pub async fn run(&self, ctx: &mut SessionContext, task: &RemediationTask) -> SessionReport {
        let mut report = SessionReport::new(ctx.id.clone());
        let specs = self.registry.specs();

        match self.opening_messages(ctx, task, &specs) {
            Ok(messages) => {
                for message in messages {
                    ctx.transcript.push(message);
                }
            }
            Err(e) => {
                error!(session = %ctx.id, "could not build prompts: {e:#}");
                report.outcome = SessionOutcome::Failure {
                    reason: FailureReason::Fatal(format!("prompt rendering failed: {e:#}")),
                };
                return report;
            }
        }

        info!(
            session = %ctx.id,
            target = %task.target,
            max_steps = ctx.max_steps,
            tools = specs.len(),
            "remediation session started"
        );

        let mut empty_turns = 0_u32;
        let outcome = loop {
            if report.steps >= ctx.max_steps {
                break SessionOutcome::BudgetExhausted;
            }
            report.steps += 1;
            let step = report.steps;

            let turn = match self.provider.complete(ctx.transcript.messages(), &specs).await {
                Ok(turn) => turn,
                Err(e) => {
                    error!(session = %ctx.id, step, "model request failed: {e:#}");
                    break fatal(format!("model request failed: {e:#}"));
                }
            };

            if turn.is_empty() {
                empty_turns += 1;
                if empty_turns >= 2 {
                    warn!(session = %ctx.id, step, "two consecutive empty turns");
                    break SessionOutcome::Failure {
                        reason: FailureReason::Stalled,
                    };
                }
                debug!(session = %ctx.id, step, "empty turn, nudging");
                ctx.transcript.push(Message::system(EMPTY_TURN_NUDGE));
                continue;
            }
            empty_turns = 0;

            let text = turn.content.clone().unwrap_or_default();
            let signalled = text.contains(ctx.termination_signal.as_str());
            ctx.transcript
                .push(Message::assistant(text, turn.tool_calls.clone()));

            if signalled {
                info!(session = %ctx.id, step, "termination signal received");
                skip_calls(ctx, &turn.tool_calls);
                break SessionOutcome::Success;
            }

            if let TurnEnd::Fatal(detail) = self
                .dispatch_turn(ctx, &turn.tool_calls, step, &mut report)
                .await
            {
                break fatal(detail);
            }
        };

        report.outcome = outcome;
        report.final_text = ctx.transcript.last_assistant_text().map(String::from);

        let roll_back = match report.outcome {
            SessionOutcome::Failure { .. } => true,
            SessionOutcome::BudgetExhausted => self.rollback_on_budget_exhausted,
            SessionOutcome::Success => false,
        };
        if roll_back {
            report.rollback = Some(self.rollback(ctx).await);
        }

        info!(
            session = %ctx.id,
            outcome = report.outcome.label(),
            steps = report.steps,
            tool_calls = report.tool_calls,
            "remediation session finished"
        );
        report
    }

    fn opening_messages(
        &self,
        ctx: &SessionContext,
        task: &RemediationTask,
        specs: &[ToolSpec],
    ) -> anyhow::Result<Vec<Message>> {
        let engine = TeraEngine::from_config(&self.prompts)?;
        let memory_prefix = ctx
            .policy
            .roots()
            .iter()
            .find_map(|root| root.virtual_prefix.as_deref());
        let system = build_system_prompt(
            &engine,
            &SystemPromptInput {
                tools: specs,
                termination_signal: &ctx.termination_signal,
                memory_prefix,
                max_steps: ctx.max_steps,
            },
        )?;
        let user = build_task_prompt(&engine, task)?;
        Ok(vec![Message::system(system), Message::user(user)])
    }

    async fn dispatch_turn(
        &self,
        ctx: &mut SessionContext,
        calls: &[ToolCall],
        step: u32,
        report: &mut SessionReport,
    ) -> TurnEnd {
        let mut nudges: Vec<String> = Vec::new();

        for (index, call) in calls.iter().enumerate() {
            report.tool_calls += 1;
            debug!(session = %ctx.id, tool = %call.name, call_id = %call.id, step, "dispatching tool call");

            let result = match self.registry.dispatch(call, ctx).await {
                Ok(result) => result,
                Err(e) => {
                    error!(session = %ctx.id, tool = %call.name, call_id = %call.id, "tool failed fatally: {e:#}");
                    ctx.transcript
                        .push(Message::tool(call.id.clone(), format!("FATAL: {e:#}")));
                    skip_calls(ctx, &calls[index + 1..]);
                    return TurnEnd::Fatal(format!("{} failed: {e:#}", call.name));
                }
            };

            if let Some(kind) = result.failure {
                *report.failures.entry(kind).or_default() += 1;
                debug!(tool = %call.name, failure = %kind, "tool returned a failure");
            }

            ctx.transcript
                .push(Message::tool(call.id.clone(), result.render()));
            ctx.transcript.record(ToolCallRecord {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                target: call_target(call),
                success: result.success,
                failure: result.failure,
                step,
            });

            if let Some(pad) = &ctx.scratchpad
                && let Err(e) = pad.append(&call.name, &call.raw_arguments, &result).await
            {
                warn!("scratchpad append failed: {e:#}");
            }

            for guard in &self.guards {
                if let Some(nudge) = guard.inspect(&ctx.transcript) {
                    debug!(guard = guard.name(), step, "loop guard fired");
                    nudges.push(nudge);
                }
            }
        }

        let mut seen = HashSet::new();
        for nudge in nudges {
            if seen.insert(nudge.clone()) {
                ctx.transcript.push(Message::system(nudge));
            }
        }
        TurnEnd::Continue
    }

    async fn rollback(&self, ctx: &SessionContext) -> RollbackOutcome {
        let root = ctx.policy.project_root();
        match self.vcs.rollback(root).await {
            Ok(()) => {
                info!(session = %ctx.id, root = %root.display(), "rollback completed");
                RollbackOutcome::Completed
            }
            Err(e) => {
                error!(session = %ctx.id, root = %root.display(), "rollback failed: {e:#}");
                RollbackOutcome::Failed(format!("{e:#}"))
            }
        }
    }
}

fn fatal(detail: String) -> SessionOutcome {
    SessionOutcome::Failure {
        reason: FailureReason::Fatal(detail),
    }
}

/// Answer every call that will not be dispatched so each call keeps exactly one result.
fn skip_calls(ctx: &mut SessionContext, calls: &[ToolCall]) {
    let skipped = ToolResult::failed(FailureKind::Skipped, SKIPPED_MESSAGE).render();
    for call in calls {
        ctx.transcript
            .push(Message::tool(call.id.clone(), skipped.clone()));
    }
}

fn call_target(call: &ToolCall) -> Option<String> {
    let args = parse_raw_arguments(&call.raw_arguments).ok()?;
    let key = if call.name == "run_command" {
        "command"
    } else {
        "path"
    };
    args.get(key).and_then(Value::as_str).map(String::from)
}
