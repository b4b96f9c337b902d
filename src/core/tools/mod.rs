pub mod audit_logs;
pub mod checkpoint;
mod common;
pub mod file_list;
pub mod file_read;
pub mod file_write;
pub mod knowledge;
pub mod propose_fix;
pub mod registry;
pub mod shell;
pub mod status;
pub mod traits;

pub use audit_logs::AuditLogsTool;
pub use common::content_digest;
pub use checkpoint::CheckpointTool;
pub use file_list::ListFilesTool;
pub use file_read::ReadFileTool;
pub use file_write::WriteFixTool;
pub use knowledge::{KnowledgeBase, KnowledgeEntry, KnowledgeTool};
pub use propose_fix::ProposeFixTool;
pub use registry::ToolRegistry;
pub use shell::RunCommandTool;
pub use status::StatusTool;
pub use traits::{FailureKind, Tool, ToolResult, ToolSpec};

#[cfg(test)]
pub(crate) use common::test_support;

/// The remediation tool surface exposed to the model.
pub fn remediation_tools() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ReadFileTool));
    registry.register(Box::new(ListFilesTool));
    registry.register(Box::new(ProposeFixTool));
    registry.register(Box::new(WriteFixTool));
    registry.register(Box::new(RunCommandTool));
    registry.register(Box::new(CheckpointTool));
    registry.register(Box::new(StatusTool));
    registry.register(Box::new(AuditLogsTool));
    registry.register(Box::new(KnowledgeTool));
    registry
}
