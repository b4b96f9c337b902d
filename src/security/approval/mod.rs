mod auditor;
mod gate;

pub use auditor::{ModelAuditor, parse_verdict};
pub use gate::{ApprovalGate, ApprovalState, PATH_MISPLACEMENT, Proposal, read_current};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Structured auditor decision. Internal logic never re-parses prose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Approved { rationale: String },
    Rejected { rationale: String },
}

impl Verdict {
    pub fn approved(rationale: impl Into<String>) -> Self {
        Self::Approved {
            rationale: rationale.into(),
        }
    }

    pub fn rejected(rationale: impl Into<String>) -> Self {
        Self::Rejected {
            rationale: rationale.into(),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    pub fn rationale(&self) -> &str {
        match self {
            Self::Approved { rationale } | Self::Rejected { rationale } => rationale,
        }
    }

    pub fn label(&self) -> &'static str {
        if self.is_approved() {
            "APPROVED"
        } else {
            "REJECTED"
        }
    }
}

/// Everything the auditor sees when reviewing a proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    pub path: String,
    pub proposed: String,
    /// On-disk content, `None` for a new file.
    pub current: Option<String>,
    /// Latest failure evidence (lint or test output) from this session.
    pub evidence: Option<String>,
}

/// External review collaborator consulted by the approval gate.
#[async_trait]
pub trait Auditor: Send + Sync {
    async fn review(&self, request: &ReviewRequest) -> anyhow::Result<Verdict>;
}
