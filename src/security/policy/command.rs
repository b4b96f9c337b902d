use std::time::Duration;

use super::SandboxPolicy;
use crate::error::CommandRejected;

/// Character sequences that chain, substitute, or redirect commands.
const BLOCKED_SEQUENCES: &[&str] = &["$(", "${", "`", "&", "|", ";", "\n", "\r", "<", ">"];

/// Environment variables safe to pass to subprocesses.
/// Only functional variables are included -- never API keys or secrets.
const SAFE_ENV_VARS: &[&str] = &[
    "PATH", "HOME", "TERM", "LANG", "LC_ALL", "LC_CTYPE", "USER", "TMPDIR",
];

/// Execution bounds for gated commands.
#[derive(Debug, Clone, Copy)]
pub struct CommandLimits {
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

impl Default for CommandLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_output_bytes: 1_048_576,
        }
    }
}

/// Captured result of a command that passed the gate and was executed.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    fn spawn_failure(message: String) -> Self {
        Self {
            stderr: message,
            ..Self::default()
        }
    }

    /// Stdout and stderr reported together.
    pub fn combined(&self) -> String {
        let mut text = String::new();
        if !self.stdout.trim().is_empty() {
            text.push_str("STDOUT:\n");
            text.push_str(self.stdout.trim_end());
            text.push('\n');
        }
        if !self.stderr.trim().is_empty() {
            text.push_str("STDERR:\n");
            text.push_str(self.stderr.trim_end());
            text.push('\n');
        }
        if text.is_empty() {
            text.push_str("(no output)\n");
        }
        text
    }
}

/// Split a command line into argv, honoring single and double quotes.
fn tokenize(command: &str) -> Result<Vec<String>, CommandRejected> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for ch in command.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None if ch == '\'' || ch == '"' => {
                quote = Some(ch);
                in_token = true;
            }
            None if ch.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(ch);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return Err(CommandRejected::UnbalancedQuote);
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn truncate_output(text: &mut String, max_bytes: usize, label: &str) {
    if text.len() > max_bytes {
        text.truncate(text.floor_char_boundary(max_bytes));
        text.push_str(&format!("\n... [{label} truncated at {max_bytes} bytes]"));
    }
}

impl SandboxPolicy {
    /// Validate a command against the metacharacter blocklist and the prefix allowlist.
    ///
    /// Returns the argv to execute. Prefixes match whole tokens, so `ls` allows
    /// `ls -la` but not `lsof`.
    pub fn check_command(&self, command: &str) -> Result<Vec<String>, CommandRejected> {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return Err(CommandRejected::Empty);
        }

        if let Some(seq) = BLOCKED_SEQUENCES.iter().find(|seq| trimmed.contains(**seq)) {
            return Err(CommandRejected::Metacharacter(
                seq.escape_default().to_string(),
            ));
        }

        let argv = tokenize(trimmed)?;
        if argv.is_empty() {
            return Err(CommandRejected::Empty);
        }

        let allowed = self.allowed_commands.iter().any(|entry| {
            let prefix: Vec<&str> = entry.split_whitespace().collect();
            !prefix.is_empty()
                && argv.len() >= prefix.len()
                && argv.iter().zip(&prefix).all(|(arg, want)| arg == want)
        });
        if !allowed {
            return Err(CommandRejected::NotAllowlisted(trimmed.to_string()));
        }

        Ok(argv)
    }

    /// Gate and execute a command in the project root without a shell.
    ///
    /// Only a rejection is an `Err`; a command that fails, times out, or cannot
    /// be spawned is reported through [`CommandOutput`].
    pub async fn run_command(
        &self,
        command: &str,
        limits: CommandLimits,
    ) -> Result<CommandOutput, CommandRejected> {
        let argv = self.check_command(command)?;
        let (program, args) = argv.split_first().ok_or(CommandRejected::Empty)?;

        // Clear the environment to prevent leaking API keys and other secrets,
        // then re-add only safe, functional variables.
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .current_dir(self.project_root())
            .env_clear()
            .kill_on_drop(true);
        for var in SAFE_ENV_VARS {
            if let Ok(val) = std::env::var(var) {
                cmd.env(var, val);
            }
        }

        let result = tokio::time::timeout(limits.timeout, cmd.output()).await;

        Ok(match result {
            Ok(Ok(output)) => {
                let mut stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let mut stderr = String::from_utf8_lossy(&output.stderr).to_string();
                truncate_output(&mut stdout, limits.max_output_bytes, "output");
                truncate_output(&mut stderr, limits.max_output_bytes, "stderr");
                CommandOutput {
                    exit_code: output.status.code(),
                    success: output.status.success(),
                    timed_out: false,
                    stdout,
                    stderr,
                }
            }
            Ok(Err(e)) => CommandOutput::spawn_failure(format!("Failed to execute command: {e}")),
            Err(_) => CommandOutput {
                timed_out: true,
                stderr: format!(
                    "Command timed out after {}s and was killed",
                    limits.timeout.as_secs()
                ),
                ..CommandOutput::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::policy::SandboxRoot;
    use tempfile::TempDir;

    fn policy_with_allowed(root: &std::path::Path, allowed: &[&str]) -> SandboxPolicy {
        SandboxPolicy::new(
            vec![SandboxRoot::new("project", root)],
            vec![],
            allowed.iter().map(ToString::to_string).collect(),
        )
        .expect("policy")
    }

    #[test]
    fn tokenize_splits_on_whitespace() {
        assert_eq!(
            tokenize("npm  test\t-- a.test.ts").expect("tokens"),
            vec!["npm", "test", "--", "a.test.ts"]
        );
    }

    #[test]
    fn tokenize_groups_quoted_arguments() {
        assert_eq!(
            tokenize(r#"npx jest -t "handles empty input" 'x y'"#).expect("tokens"),
            vec!["npx", "jest", "-t", "handles empty input", "x y"]
        );
        assert_eq!(tokenize("ls ''").expect("tokens"), vec!["ls", ""]);
    }

    #[test]
    fn tokenize_rejects_unbalanced_quotes() {
        assert_eq!(
            tokenize("npm test \"oops"),
            Err(CommandRejected::UnbalancedQuote)
        );
    }

    #[test]
    fn accepts_allowlisted_prefixes() {
        let root = TempDir::new().expect("tempdir");
        let policy = policy_with_allowed(root.path(), &["npm test", "npx @biomejs/biome", "ls"]);

        assert!(policy.check_command("npm test").is_ok());
        assert!(policy.check_command("npm test -- src/a.test.ts").is_ok());
        assert!(policy.check_command("npx @biomejs/biome check src/a.ts").is_ok());
        assert!(policy.check_command("  ls -la  ").is_ok());
    }

    #[test]
    fn prefix_match_is_token_wise() {
        let root = TempDir::new().expect("tempdir");
        let policy = policy_with_allowed(root.path(), &["ls", "npm test"]);

        assert!(matches!(
            policy.check_command("lsof"),
            Err(CommandRejected::NotAllowlisted(_))
        ));
        assert!(matches!(
            policy.check_command("npm testx"),
            Err(CommandRejected::NotAllowlisted(_))
        ));
        assert!(matches!(
            policy.check_command("npm publish"),
            Err(CommandRejected::NotAllowlisted(_))
        ));
    }

    #[test]
    fn rejects_chaining_and_substitution() {
        let root = TempDir::new().expect("tempdir");
        let policy = policy_with_allowed(root.path(), &["npm test", "ls"]);

        for command in [
            "rm -rf /; npm test",
            "npm test && rm -rf /",
            "npm test & sleep 1",
            "ls | sh",
            "ls $(whoami)",
            "ls ${HOME}",
            "ls `id`",
            "ls > out.txt",
            "ls < in.txt",
            "ls\nrm -rf /",
        ] {
            assert!(
                matches!(
                    policy.check_command(command),
                    Err(CommandRejected::Metacharacter(_))
                ),
                "should reject: {command}"
            );
        }
    }

    #[test]
    fn rejects_empty_commands() {
        let root = TempDir::new().expect("tempdir");
        let policy = policy_with_allowed(root.path(), &["ls"]);

        assert_eq!(policy.check_command(""), Err(CommandRejected::Empty));
        assert_eq!(policy.check_command("   \t "), Err(CommandRejected::Empty));
    }

    #[test]
    fn is_case_sensitive() {
        let root = TempDir::new().expect("tempdir");
        let policy = policy_with_allowed(root.path(), &["ls"]);
        assert!(policy.check_command("LS").is_err());
    }

    #[test]
    fn combined_output_labels_streams() {
        let output = CommandOutput {
            stdout: "ok\n".into(),
            stderr: "warn\n".into(),
            ..CommandOutput::default()
        };
        let text = output.combined();
        assert!(text.contains("STDOUT:\nok"));
        assert!(text.contains("STDERR:\nwarn"));
        assert_eq!(CommandOutput::default().combined(), "(no output)\n");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut text = "é".repeat(10);
        truncate_output(&mut text, 5, "output");
        assert!(text.starts_with("éé"));
        assert!(text.contains("truncated"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_allowlisted_command_in_project_root() {
        let root = TempDir::new().expect("tempdir");
        std::fs::write(root.path().join("marker.txt"), "x").expect("write");
        let policy = policy_with_allowed(root.path(), &["ls"]);

        let output = policy
            .run_command("ls", CommandLimits::default())
            .await
            .expect("allowed");
        assert!(output.success);
        assert!(output.stdout.contains("marker.txt"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_is_reported_not_raised() {
        let root = TempDir::new().expect("tempdir");
        let policy = policy_with_allowed(root.path(), &["ls"]);

        let output = policy
            .run_command("ls /nonexistent_dir_xyz", CommandLimits::default())
            .await
            .expect("allowed");
        assert!(!output.success);
        assert!(!output.stderr.is_empty());
    }

    #[tokio::test]
    async fn rejected_command_never_spawns() {
        let root = TempDir::new().expect("tempdir");
        let policy = policy_with_allowed(root.path(), &["npm test"]);

        let result = policy
            .run_command("rm -rf /; npm test", CommandLimits::default())
            .await;
        assert!(matches!(result, Err(CommandRejected::Metacharacter(_))));
    }
}
