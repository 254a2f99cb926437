//! Remediation executor
//!
//! Applies a validated plan along one of two paths:
//! - operational: shell commands in order, each under a timeout, stopping at
//!   the first failure
//! - code edit: exact-match patch, git commit/push (best effort), image
//!   rebuild and container replacement
//!
//! Nothing is rolled back. A failure part way through is reported with the
//! stage it happened in.

use crate::adapters::{CommandLine, CommandRunner, DockerCli, GitRepo};
use crate::config::ExecutorConfig;
use crate::domain::{
    ExecutionResult, FailedStage, FileChange, GitOutcome, RemediationAction, RemediationPlan,
    StepStatus,
};
use crate::error::HealError;
use crate::workspace::SourceTree;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct RemediationExecutor {
    runner: Arc<dyn CommandRunner>,
    docker: DockerCli,
    git: GitRepo,
    sources: SourceTree,
    config: ExecutorConfig,
}

impl RemediationExecutor {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        docker: DockerCli,
        git: GitRepo,
        sources: SourceTree,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            runner,
            docker,
            git,
            sources,
            config,
        }
    }

    pub async fn execute(&self, plan: &RemediationPlan) -> ExecutionResult {
        match &plan.action {
            RemediationAction::Operational { commands, .. } => self.run_commands(commands).await,
            RemediationAction::CodeEdit {
                files,
                commit_message,
            } => self.apply_code_edit(files, commit_message.as_deref()).await,
        }
    }

    /// Run commands strictly in order; the first nonzero exit, timeout or
    /// spawn failure ends the sequence.
    pub async fn run_commands(&self, commands: &[String]) -> ExecutionResult {
        let mut result = ExecutionResult::default();
        let limit = self.config.command_timeout();

        for command in commands {
            info!("Executing: {}", command);
            let cmd = CommandLine::shell(command).in_dir(self.sources.root());

            match self.runner.run(&cmd, limit).await {
                Ok(out) if out.success() => {
                    result.record(command, StepStatus::Succeeded);
                    result.output.push(out.stdout);
                }
                Ok(out) => {
                    result.record(
                        command,
                        StepStatus::Failed {
                            exit_code: out.exit_code,
                            stderr: out.stderr.clone(),
                        },
                    );
                    result.output.push(out.stdout);
                    error!("Command failed ({:?}): {}", out.exit_code, command);
                    return result.fail(
                        FailedStage::Commands,
                        format!("Command failed: {}\n{}", command, out.stderr),
                    );
                }
                Err(e) => {
                    result.record(command, step_status_for(&e));
                    error!("Error executing {}: {}", command, e);
                    return result
                        .fail(FailedStage::Commands, format!("Error executing {}: {}", command, e));
                }
            }
        }

        result.succeed()
    }

    async fn apply_code_edit(
        &self,
        files: &[FileChange],
        commit_message: Option<&str>,
    ) -> ExecutionResult {
        let mut result = ExecutionResult::default();

        info!("Applying code fixes to {} file(s)", files.len());
        match self.sources.apply(files).await {
            Ok(edited) => {
                info!("Fixed files: {:?}", edited);
                result.files_edited = edited;
            }
            Err(e) => {
                error!("Code fix failed: {}", e);
                result.files_edited = e.written_files().to_vec();
                return result.fail(FailedStage::Patch, e.to_string());
            }
        }

        result.git = Some(match commit_message {
            Some(message) => {
                let full = GitRepo::commit_message(message, &self.config.fix_marker);
                let (outcome, trace) = self.git.commit_all(&full).await;
                for (command, status) in trace {
                    result.record(&command, status);
                }
                outcome
            }
            None => {
                warn!("No commit message supplied, skipping git commit");
                GitOutcome::Skipped
            }
        });

        match self.rebuild_and_restart(&mut result).await {
            Ok(()) => {
                info!("Rebuild and restart successful");
                result.succeed()
            }
            Err(reason) => {
                error!("Rebuild failed: {}", reason);
                result.fail(FailedStage::Rebuild, reason)
            }
        }
    }

    /// Build the image, drop the old container, start a fresh one
    async fn rebuild_and_restart(&self, result: &mut ExecutionResult) -> Result<(), String> {
        let build = self.docker.build_command();
        self.required_step(&build, self.config.build_timeout(), result)
            .await?;

        for cmd in [self.docker.stop_command(), self.docker.remove_command()] {
            self.tolerated_step(&cmd, self.config.command_timeout(), result)
                .await;
        }

        let run = self.docker.run_command();
        self.required_step(&run, self.config.command_timeout(), result)
            .await
    }

    async fn required_step(
        &self,
        cmd: &CommandLine,
        limit: Duration,
        result: &mut ExecutionResult,
    ) -> Result<(), String> {
        let command = cmd.to_string();
        match self.docker.run_step(cmd, limit).await {
            Ok(out) if out.success() => {
                result.record(&command, StepStatus::Succeeded);
                result.output.push(out.stdout);
                Ok(())
            }
            Ok(out) => {
                result.record(
                    &command,
                    StepStatus::Failed {
                        exit_code: out.exit_code,
                        stderr: out.stderr.clone(),
                    },
                );
                Err(format!("Command failed: {}\n{}", command, out.stderr))
            }
            Err(e) => {
                result.record(&command, step_status_for(&e));
                Err(format!("Error executing {}: {}", command, e))
            }
        }
    }

    async fn tolerated_step(&self, cmd: &CommandLine, limit: Duration, result: &mut ExecutionResult) {
        let command = cmd.to_string();
        let status = match self.docker.run_step(cmd, limit).await {
            Ok(out) if out.success() => StepStatus::Succeeded,
            Ok(out) => StepStatus::Tolerated {
                reason: out.stderr.trim().to_string(),
            },
            Err(e) => StepStatus::Tolerated {
                reason: e.to_string(),
            },
        };
        result.record(&command, status);
    }
}

fn step_status_for(err: &HealError) -> StepStatus {
    match err {
        HealError::CommandTimeout { timeout_secs, .. } => StepStatus::TimedOut {
            timeout_secs: *timeout_secs,
        },
        other => StepStatus::SpawnFailed {
            reason: other.to_string(),
        },
    }
}
