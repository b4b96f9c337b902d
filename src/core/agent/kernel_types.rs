use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::tools::FailureKind;

/// One remediation: one target file, one vulnerability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationTask {
    /// Path of the vulnerable file, relative to the project root
    pub target: String,
    /// Short vulnerability description (e.g. "SQL injection in findUser")
    pub vulnerability: String,
    /// Scanner output or other evidence handed to the model verbatim
    #[serde(default)]
    pub details: Option<String>,
}

impl RemediationTask {
    pub fn new(target: impl Into<String>, vulnerability: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            vulnerability: vulnerability.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Two consecutive empty model turns
    Stalled,
    /// An error escaped a tool, the model collaborator, or the prompt renderer
    Fatal(String),
}

/// Terminal state of the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Success,
    Failure { reason: FailureReason },
    BudgetExhausted,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failure { .. } => "FAILURE",
            Self::BudgetExhausted => "BUDGET_EXHAUSTED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RollbackOutcome {
    Completed,
    Failed(String),
}

/// What the operator sees at the end of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: String,
    pub outcome: SessionOutcome,
    /// Model turns requested
    pub steps: u32,
    pub tool_calls: u32,
    /// Recoverable failures by kind (denials, rejections, validation failures, ...)
    pub failures: BTreeMap<FailureKind, u32>,
    pub rollback: Option<RollbackOutcome>,
    pub final_text: Option<String>,
}

impl SessionReport {
    pub(crate) fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            outcome: SessionOutcome::BudgetExhausted,
            steps: 0,
            tool_calls: 0,
            failures: BTreeMap::new(),
            rollback: None,
            final_text: None,
        }
    }

    pub fn failure_count(&self, kind: FailureKind) -> u32 {
        self.failures.get(&kind).copied().unwrap_or(0)
    }
}
