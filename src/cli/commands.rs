use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// `patchwarden` - supervised, sandboxed LLM vulnerability remediation.
#[derive(Parser, Debug)]
#[command(name = "patchwarden")]
#[command(version)]
#[command(about = "Remediate a vulnerability with an audited, sandboxed agent.", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.patchwarden/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Run one remediation session against a vulnerable file
    Run {
        /// Vulnerable file, relative to the project root
        target: String,

        /// Short description of the vulnerability
        vulnerability: String,

        /// Scanner output or other evidence for the model
        #[arg(long)]
        details: Option<String>,

        /// Commit and push the fix on success
        #[arg(long)]
        commit: bool,

        /// Open a pull request after pushing (implies --commit)
        #[arg(long)]
        open_pr: bool,
    },

    /// Show recent audit log entries
    Audit {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: u32,

        /// Only entries with this status (success, rejected, access_denied, ...)
        #[arg(long)]
        status: Option<String>,
    },

    /// Inspect or restore saved checkpoints
    Checkpoint {
        #[command(subcommand)]
        checkpoint_command: CheckpointCommands,
    },

    /// Discard every uncommitted change in the project root
    Rollback,
}

#[derive(Subcommand, Debug)]
pub enum CheckpointCommands {
    /// Print the checkpoint for a path, or list all checkpoints
    Show { path: Option<String> },

    /// Write the checkpoint for a path back to disk
    Restore {
        path: String,

        /// Also restore content the agent saved without review
        #[arg(long)]
        unreviewed: bool,
    },
}
