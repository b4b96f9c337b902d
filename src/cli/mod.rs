pub mod commands;

pub use commands::{CheckpointCommands, Cli, Commands};
