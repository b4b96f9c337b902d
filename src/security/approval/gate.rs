use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use strum::{Display, EnumString};
use tracing::{info, warn};

use super::{Auditor, ReviewRequest, Verdict};
use crate::security::policy::{PROJECT_ROOT_NAME, ResolvedPath};
use crate::store::CheckpointStore;

/// Rationale prefix for test files proposed under the source tree.
pub const PATH_MISPLACEMENT: &str = "PATH_MISPLACEMENT";

const SOURCE_DIR: &str = "src";

/// Per-path state. Absence from the gate is the `NONE` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    Proposed,
    Approved,
    Rejected,
    Consumed,
}

/// The most recent proposal for one path.
#[derive(Debug, Clone)]
pub struct Proposal {
    pub path: String,
    pub proposed_content: String,
    pub basis_content: Option<String>,
    pub state: ApprovalState,
    pub sequence: u64,
    pub rationale: Option<String>,
}

/// Tracks, per normalized physical path, whether the latest proposal may authorize a write.
///
/// A new proposal for a path replaces whatever was there, so older approvals cannot be
/// resurrected. Approvals are single use.
#[derive(Debug, Default)]
pub struct ApprovalGate {
    proposals: HashMap<PathBuf, Proposal>,
    next_sequence: u64,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Review `proposed` for `target`, record the verdict, and checkpoint it on approval.
    ///
    /// The path enters `Proposed` before the auditor is consulted; an auditor error leaves
    /// it there and propagates.
    pub async fn propose(
        &mut self,
        target: &ResolvedPath,
        proposed: &str,
        auditor: &dyn Auditor,
        evidence: Option<&str>,
        checkpoints: &CheckpointStore,
    ) -> anyhow::Result<Verdict> {
        let current = read_current(&target.physical)
            .await
            .with_context(|| format!("read current content of {}", target.display_path()))?;
        self.propose_over(target, proposed, current, auditor, evidence, checkpoints)
            .await
    }

    /// Like [`ApprovalGate::propose`], with the current content already read by the caller.
    pub async fn propose_over(
        &mut self,
        target: &ResolvedPath,
        proposed: &str,
        current: Option<String>,
        auditor: &dyn Auditor,
        evidence: Option<&str>,
        checkpoints: &CheckpointStore,
    ) -> anyhow::Result<Verdict> {
        let shown = target.display_path();
        let sequence = self.begin(target, proposed, current.clone());

        let verdict = if is_misplaced_test(target) {
            Verdict::rejected(format!(
                "{PATH_MISPLACEMENT}: test files belong outside '{SOURCE_DIR}/'; \
propose this file under the test directory instead"
            ))
        } else {
            let request = ReviewRequest {
                path: shown.clone(),
                proposed: proposed.to_string(),
                current,
                evidence: evidence.map(ToString::to_string),
            };
            auditor.review(&request).await?
        };

        if !self.record(&target.physical, sequence, &verdict) {
            warn!(path = %shown, sequence, "proposal superseded before verdict was recorded");
        }
        info!(path = %shown, verdict = verdict.label(), "proposal reviewed");

        if verdict.is_approved() {
            checkpoints
                .save(&shown, proposed)
                .await
                .with_context(|| format!("checkpoint approved content of {shown}"))?;
        }

        Ok(verdict)
    }

    /// Enter `Proposed` for the path, superseding any earlier proposal.
    pub fn begin(
        &mut self,
        target: &ResolvedPath,
        proposed: &str,
        basis: Option<String>,
    ) -> u64 {
        self.next_sequence += 1;
        let sequence = self.next_sequence;
        self.proposals.insert(
            target.physical.clone(),
            Proposal {
                path: target.display_path(),
                proposed_content: proposed.to_string(),
                basis_content: basis,
                state: ApprovalState::Proposed,
                sequence,
                rationale: None,
            },
        );
        sequence
    }

    /// Attach a verdict to the proposal with `sequence`. Returns false if it was superseded.
    pub fn record(&mut self, physical: &Path, sequence: u64, verdict: &Verdict) -> bool {
        let Some(proposal) = self.proposals.get_mut(physical) else {
            return false;
        };
        if proposal.sequence != sequence || proposal.state != ApprovalState::Proposed {
            return false;
        }
        proposal.state = if verdict.is_approved() {
            ApprovalState::Approved
        } else {
            ApprovalState::Rejected
        };
        proposal.rationale = Some(verdict.rationale().to_string());
        true
    }

    /// True iff the latest proposal for exactly this path is approved and unconsumed.
    pub fn authorize_write(&self, physical: &Path) -> bool {
        self.state(physical) == Some(ApprovalState::Approved)
    }

    /// Content the current approval was granted for, if the path is approved.
    pub fn approved_content(&self, physical: &Path) -> Option<&str> {
        self.proposals
            .get(physical)
            .filter(|p| p.state == ApprovalState::Approved)
            .map(|p| p.proposed_content.as_str())
    }

    /// `Approved -> Consumed`. Returns false if there was nothing to consume.
    pub fn consume(&mut self, physical: &Path) -> bool {
        match self.proposals.get_mut(physical) {
            Some(proposal) if proposal.state == ApprovalState::Approved => {
                proposal.state = ApprovalState::Consumed;
                true
            }
            _ => false,
        }
    }

    pub fn state(&self, physical: &Path) -> Option<ApprovalState> {
        self.proposals.get(physical).map(|p| p.state)
    }

    pub fn proposal(&self, physical: &Path) -> Option<&Proposal> {
        self.proposals.get(physical)
    }

    /// Display path of the most recently proposed file, if any.
    pub fn latest(&self) -> Option<&Proposal> {
        self.proposals.values().max_by_key(|p| p.sequence)
    }

    pub fn clear(&mut self) {
        self.proposals.clear();
    }
}

fn is_misplaced_test(target: &ResolvedPath) -> bool {
    let under_source = target
        .relative
        .components()
        .next()
        .is_some_and(|c| c.as_os_str() == SOURCE_DIR);
    let name_is_test = target
        .relative
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .is_some_and(|n| n.contains(".test.") || n.contains(".spec."));
    target.root == PROJECT_ROOT_NAME && under_source && name_is_test
}

/// Text currently stored at `path`, or `None` when nothing exists there yet.
///
/// Bytes that are not valid UTF-8 are replaced, so binary or mis-encoded files still have a
/// basis the auditor can compare against.
pub async fn read_current(path: &Path) -> std::io::Result<Option<String>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
