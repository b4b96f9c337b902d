mod builder;
mod engine;

pub use builder::{SystemPromptInput, build_system_prompt, build_task_prompt};
pub use engine::TeraEngine;
