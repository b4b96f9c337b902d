use super::response::{Message, ModelTurn};
use crate::core::tools::ToolSpec;
use async_trait::async_trait;

/// The model collaborator: one turn given the full transcript and the tool schemas.
///
/// Implementations must support structured tool-call emission. The kernel depends on
/// nothing vendor-specific beyond this.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn complete(&self, transcript: &[Message], tools: &[ToolSpec])
    -> anyhow::Result<ModelTurn>;

    /// Warm up the HTTP connection pool. Default is a no-op.
    async fn warmup(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
