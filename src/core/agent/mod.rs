pub mod guards;
pub mod kernel;
pub mod kernel_types;
pub mod scratchpad;
pub mod transcript;

pub use guards::{
    LoopGuard, RepeatedFailureGuard, RepeatedReadGuard, UnapprovedWriteGuard, guards_from_config,
};
pub use kernel::Kernel;
pub use kernel_types::{
    FailureReason, RemediationTask, RollbackOutcome, SessionOutcome, SessionReport,
};
pub use scratchpad::{SCRATCHPAD_FILE, Scratchpad};
pub use transcript::{ToolCallRecord, Transcript};
