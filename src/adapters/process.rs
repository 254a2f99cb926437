//! Subprocess execution with bounded waits
//!
//! Every external tool (docker, git, oracle-supplied shell commands) goes
//! through [`CommandRunner`] so the pipeline can be exercised with scripted
//! fakes.

use crate::error::{HealError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Program {
    /// Free-form command line interpreted by `sh -c`
    Shell(String),
    Exec { program: String, args: Vec<String> },
}

/// A command to run, with an optional working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: Program,
    cwd: Option<PathBuf>,
}

impl CommandLine {
    /// Program with arguments, no shell involved
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: Program::Exec {
                program: program.to_string(),
                args: args.into_iter().map(Into::into).collect(),
            },
            cwd: None,
        }
    }

    /// Command string run through `sh -c`
    pub fn shell(command: &str) -> Self {
        Self {
            program: Program::Shell(command.to_string()),
            cwd: None,
        }
    }

    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn program(&self) -> &str {
        match &self.program {
            Program::Shell(_) => "sh",
            Program::Exec { program, .. } => program,
        }
    }

    pub fn args(&self) -> Vec<&str> {
        match &self.program {
            Program::Shell(cmd) => vec!["-c", cmd.as_str()],
            Program::Exec { args, .. } => args.iter().map(String::as_str).collect(),
        }
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(self.program());
        cmd.args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.program {
            Program::Shell(cmd) => write!(f, "{}", cmd),
            Program::Exec { program, args } => {
                write!(f, "{}", program)?;
                for arg in args {
                    if arg.is_empty() || arg.contains(char::is_whitespace) {
                        write!(f, " '{}'", arg.replace('\'', "'\\''"))?;
                    } else {
                        write!(f, " {}", arg)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

/// Runs commands to completion under a timeout.
///
/// `Err` means the process never produced an exit status (spawn failure or
/// timeout); a nonzero exit is an `Ok` output the caller must inspect.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &CommandLine, limit: Duration) -> Result<CommandOutput>;
}

/// [`CommandRunner`] backed by real processes
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &CommandLine, limit: Duration) -> Result<CommandOutput> {
        debug!("Running: {}", command);

        let child = command
            .to_command()
            .spawn()
            .map_err(|e| HealError::CommandSpawn {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        // kill_on_drop reaps the child when the timeout drops the future
        let output = timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| HealError::CommandTimeout {
                command: command.to_string(),
                timeout_secs: limit.as_secs(),
            })?
            .map_err(|e| HealError::CommandSpawn {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_whitespace_args() {
        let cmd = CommandLine::new("git", ["commit", "-m", "Fix: it's done"]);
        assert_eq!(cmd.to_string(), "git commit -m 'Fix: it'\\''s done'");
    }

    #[test]
    fn test_shell_display_is_raw() {
        let cmd = CommandLine::shell("docker restart svc && echo ok");
        assert_eq!(cmd.to_string(), "docker restart svc && echo ok");
        assert_eq!(cmd.program(), "sh");
        assert_eq!(cmd.args(), vec!["-c", "docker restart svc && echo ok"]);
    }

    #[tokio::test]
    async fn test_shell_runner_captures_output() {
        let out = ShellRunner::new()
            .run(&CommandLine::shell("echo hello; echo oops >&2; exit 3"), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.stderr, "oops\n");
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_shell_runner_times_out() {
        let err = ShellRunner::new()
            .run(&CommandLine::shell("sleep 5"), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = ShellRunner::new()
            .run(
                &CommandLine::new("definitely-not-a-real-binary-xyz", Vec::<String>::new()),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HealError::CommandSpawn { .. }));
    }
}
