pub mod schema;

pub use schema::{
    CommandsConfig, Config, KernelConfig, KnowledgeConfig, LinterKind, ModelConfig, PromptConfig,
    SandboxConfig, StoreConfig, VcsConfig, VerifyConfig, WriteGuardConfig, expand_path,
};
