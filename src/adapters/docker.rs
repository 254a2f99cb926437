//! Docker CLI adapter
//!
//! Status/log queries for the probe, and the rebuild + container
//! replacement sequence used after a code edit.

use crate::adapters::process::{CommandLine, CommandOutput, CommandRunner};
use crate::config::ServiceConfig;
use crate::error::{HealError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Docker operations against one named container
#[derive(Clone)]
pub struct DockerCli {
    runner: Arc<dyn CommandRunner>,
    container: String,
    image: String,
    project_dir: PathBuf,
    volumes: Vec<String>,
    restart_policy: String,
}

impl DockerCli {
    pub fn new(runner: Arc<dyn CommandRunner>, service: &ServiceConfig) -> Self {
        Self {
            runner,
            container: service.name.clone(),
            image: service.image.clone(),
            project_dir: service.project_dir.clone(),
            volumes: service.volumes.clone(),
            restart_policy: service.restart_policy.clone(),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn status_command(&self) -> CommandLine {
        CommandLine::new(
            "docker",
            [
                "ps".to_string(),
                "--filter".to_string(),
                format!("name={}", self.container),
                "--format".to_string(),
                "{{.Status}}".to_string(),
            ],
        )
    }

    pub fn logs_command(&self, tail_lines: u32) -> CommandLine {
        CommandLine::new(
            "docker",
            [
                "logs".to_string(),
                "--tail".to_string(),
                tail_lines.to_string(),
                self.container.clone(),
            ],
        )
    }

    /// Status text of the container; empty when it is not running
    pub async fn status(&self, limit: Duration) -> Result<String> {
        let cmd = self.status_command();
        let out = self.runner.run(&cmd, limit).await?;
        if !out.success() {
            return Err(HealError::Internal(format!(
                "{} exited with {:?}: {}",
                cmd,
                out.exit_code,
                out.stderr.trim()
            )));
        }
        Ok(out.stdout.trim().to_string())
    }

    /// Last `tail_lines` lines of combined stdout/stderr
    pub async fn logs(&self, tail_lines: u32, limit: Duration) -> Result<String> {
        let out = self.runner.run(&self.logs_command(tail_lines), limit).await?;
        Ok(out.combined())
    }

    pub fn build_command(&self) -> CommandLine {
        CommandLine::new("docker", ["build", "-t", self.image.as_str(), "."])
            .in_dir(&self.project_dir)
    }

    pub fn stop_command(&self) -> CommandLine {
        CommandLine::new("docker", ["stop", self.container.as_str()])
    }

    pub fn remove_command(&self) -> CommandLine {
        CommandLine::new("docker", ["rm", self.container.as_str()])
    }

    /// `docker run` with the configured restart policy and mounts
    pub fn run_command(&self) -> CommandLine {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.container.clone(),
            "--restart".to_string(),
            self.restart_policy.clone(),
        ];
        for volume in &self.volumes {
            args.push("-v".to_string());
            args.push(resolve_mount(&self.project_dir, volume));
        }
        args.push(self.image.clone());
        CommandLine::new("docker", args).in_dir(&self.project_dir)
    }

    /// Run a step of the replace sequence, returning its output
    pub async fn run_step(&self, cmd: &CommandLine, limit: Duration) -> Result<CommandOutput> {
        info!("docker: {}", cmd);
        let out = self.runner.run(cmd, limit).await?;
        if !out.success() {
            warn!("docker step exited with {:?}: {}", out.exit_code, out.stderr.trim());
        }
        Ok(out)
    }
}

/// Resolve the host side of `host:container[:mode]` against the project dir
fn resolve_mount(project_dir: &Path, volume: &str) -> String {
    match volume.split_once(':') {
        Some((host, rest)) if !Path::new(host).is_absolute() => {
            format!("{}:{}", project_dir.join(host).display(), rest)
        }
        _ => volume.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    fn service() -> ServiceConfig {
        ServiceConfig {
            name: "gmail-monitor".to_string(),
            image: "gmail-telegram-monitor:latest".to_string(),
            project_dir: PathBuf::from("/srv/app"),
            source_files: vec![],
            volumes: vec![
                ".env:/app/.env:ro".to_string(),
                "/etc/tz:/etc/tz:ro".to_string(),
            ],
            restart_policy: "unless-stopped".to_string(),
        }
    }

    #[test]
    fn test_run_command_resolves_mounts() {
        let docker = DockerCli::new(Arc::new(ScriptedRunner::new()), &service());
        assert_eq!(
            docker.run_command().to_string(),
            "docker run -d --name gmail-monitor --restart unless-stopped \
             -v /srv/app/.env:/app/.env:ro -v /etc/tz:/etc/tz:ro gmail-telegram-monitor:latest"
        );
    }

    #[test]
    fn test_build_runs_in_project_dir() {
        let docker = DockerCli::new(Arc::new(ScriptedRunner::new()), &service());
        let cmd = docker.build_command();
        assert_eq!(cmd.cwd(), Some(Path::new("/srv/app")));
        assert_eq!(cmd.to_string(), "docker build -t gmail-telegram-monitor:latest .");
    }

    #[tokio::test]
    async fn test_status_nonzero_exit_is_error() {
        let runner = ScriptedRunner::new().on_fail("docker ps", 1, "Cannot connect to the Docker daemon");
        let docker = DockerCli::new(Arc::new(runner), &service());
        let err = docker.status(Duration::from_secs(5)).await.unwrap_err();
        assert!(err.to_string().contains("Cannot connect"));
    }

    #[tokio::test]
    async fn test_logs_combine_streams() {
        let runner = ScriptedRunner::new().on_output("docker logs", "out\n", "err\n");
        let docker = DockerCli::new(Arc::new(runner), &service());
        let logs = docker.logs(200, Duration::from_secs(5)).await.unwrap();
        assert_eq!(logs, "out\nerr\n");
    }
}
