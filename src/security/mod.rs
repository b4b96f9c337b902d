pub mod approval;
mod defaults;
pub mod policy;
pub mod write_guard;

pub use approval::{ApprovalGate, ApprovalState, Auditor, ModelAuditor, ReviewRequest, Verdict};
pub use defaults::{
    default_allowed_commands, default_ignored_entries, default_restricted_paths,
    default_structural_markers,
};
pub use policy::{CommandLimits, CommandOutput, ResolvedPath, SandboxPolicy, SandboxRoot};
pub use write_guard::{GuardViolation, WriteGuard};
