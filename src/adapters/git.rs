//! Git adapter: stage, commit and push the working tree after a patch

use crate::adapters::process::{CommandLine, CommandRunner};
use crate::domain::{GitOutcome, StepStatus};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone)]
pub struct GitRepo {
    runner: Arc<dyn CommandRunner>,
    dir: PathBuf,
    push: bool,
    timeout: Duration,
}

impl GitRepo {
    pub fn new(runner: Arc<dyn CommandRunner>, dir: PathBuf, push: bool, timeout: Duration) -> Self {
        Self {
            runner,
            dir,
            push,
            timeout,
        }
    }

    /// Full commit message: the oracle's text plus the automated-fix trailer
    pub fn commit_message(message: &str, marker: &str) -> String {
        format!("{}\n\n{}", message.trim_end(), marker)
    }

    /// Stage everything, commit and optionally push.
    ///
    /// Never fails: each step's status is returned in the trace and the
    /// overall outcome summarizes how far it got.
    pub async fn commit_all(&self, message: &str) -> (GitOutcome, Vec<(String, StepStatus)>) {
        let mut trace = Vec::new();

        let add = CommandLine::new("git", ["add", "-A"]).in_dir(&self.dir);
        if let Err(reason) = self.step(&add, &mut trace).await {
            return (GitOutcome::Failed { reason }, trace);
        }

        let commit = CommandLine::new("git", ["commit", "-m", message]).in_dir(&self.dir);
        if let Err(reason) = self.step(&commit, &mut trace).await {
            return (GitOutcome::Failed { reason }, trace);
        }

        if !self.push {
            info!("Committed fix (push disabled)");
            return (GitOutcome::Committed { pushed: false }, trace);
        }

        let push = CommandLine::new("git", ["push"]).in_dir(&self.dir);
        let pushed = match self.step(&push, &mut trace).await {
            Ok(()) => true,
            Err(reason) => {
                warn!("Git push failed (continuing anyway): {}", reason);
                false
            }
        };

        (GitOutcome::Committed { pushed }, trace)
    }

    async fn step(
        &self,
        cmd: &CommandLine,
        trace: &mut Vec<(String, StepStatus)>,
    ) -> std::result::Result<(), String> {
        let reason = match self.runner.run(cmd, self.timeout).await {
            Ok(out) if out.success() => {
                trace.push((cmd.to_string(), StepStatus::Succeeded));
                return Ok(());
            }
            Ok(out) => format!("{} exited with {:?}: {}", cmd, out.exit_code, out.combined().trim()),
            Err(e) => e.to_string(),
        };
        warn!("Git step failed: {}", reason);
        trace.push((
            cmd.to_string(),
            StepStatus::Tolerated {
                reason: reason.clone(),
            },
        ));
        Err(reason)
    }
}
