//! autoheal CLI
//!
//! Commands:
//! - `autoheal run`         - One remediation pass (default)
//! - `autoheal check`       - Probe only, print the snapshot as JSON
//! - `autoheal watch`       - Passes on a timer until interrupted
//! - `autoheal notify-test` - Send a sample notification

use crate::adapters::{CommandRunner, DockerCli, GitRepo, ShellRunner, TelegramNotifier};
use crate::agent::{build_oracle, DiagnosisClient};
use crate::config::AppConfig;
use crate::supervisor::{
    Alert, AlertLevel, Healer, HealthProbe, NotificationSink, Notifier, RemediationExecutor,
};
use crate::workspace::SourceTree;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

/// Autonomous remediation for a containerized service
#[derive(Parser, Debug)]
#[command(name = "autoheal")]
#[command(author, version, about = "Detects, diagnoses and repairs a failing container")]
pub struct Cli {
    /// Directory holding default.toml and per-environment overrides
    #[arg(long, global = true, env = "AUTOHEAL_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Dotenv file loaded before configuration
    #[arg(long, global = true, default_value = ".env")]
    pub env_file: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run a single remediation pass
    Run,

    /// Probe the service and print its health snapshot
    Check,

    /// Run passes sequentially on a fixed interval
    Watch {
        /// Seconds between the end of one pass and the start of the next
        #[arg(short, long, default_value = "300")]
        interval_secs: u64,
    },

    /// Send a test message through the notification channel
    NotifyTest,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}

/// Load the dotenv file (if present) and build configuration
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    match dotenvy::from_path(&cli.env_file) {
        Ok(()) => {}
        Err(e) if e.not_found() => {}
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to load {}", cli.env_file.display()))
        }
    }

    AppConfig::load_from(&cli.config_dir)
        .with_context(|| format!("Failed to load configuration from {}", cli.config_dir.display()))
}

/// Notification sink for the configured channel; logs only when unset
pub fn build_sink(config: &AppConfig) -> Result<NotificationSink> {
    if config.notify.bot_token.is_empty() || config.notify.chat_id.is_empty() {
        return Ok(NotificationSink::disabled());
    }
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(&config.notify)?);
    Ok(NotificationSink::new(notifier))
}

/// Wire the production components together
pub fn build_healer(config: &AppConfig) -> Result<Healer> {
    let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::new());
    let service = &config.service;

    let docker = DockerCli::new(runner.clone(), service);
    let sources = SourceTree::new(service.project_dir.clone(), service.source_files.clone());
    let git = GitRepo::new(
        runner.clone(),
        service.project_dir.clone(),
        config.executor.push,
        config.executor.command_timeout(),
    );

    let oracle = build_oracle(&config.oracle).context("Failed to build oracle client")?;

    Ok(Healer::new(
        HealthProbe::new(docker.clone(), config.probe.clone()),
        DiagnosisClient::new(oracle, &service.name, config.oracle.log_excerpt_chars),
        RemediationExecutor::new(runner, docker, git, sources.clone(), config.executor.clone()),
        sources,
        build_sink(config)?,
    ))
}

/// Sample alert for `notify-test`
pub fn test_alert(config: &AppConfig) -> Alert {
    Alert::new(AlertLevel::Info, "Autonomous Healer Test")
        .field("Container", config.service.name.as_str())
        .field("Project", config.service.project_dir.display().to_string())
        .footer("Notification channel is working")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_run() {
        let cli = Cli::parse_from(["autoheal"]);
        assert_eq!(cli.command(), Commands::Run);
        assert_eq!(cli.env_file, PathBuf::from(".env"));
    }

    #[test]
    fn test_watch_interval() {
        let cli = Cli::parse_from(["autoheal", "watch", "--interval-secs", "60"]);
        assert_eq!(cli.command(), Commands::Watch { interval_secs: 60 });
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["autoheal", "check", "--config-dir", "/etc/autoheal"]);
        assert_eq!(cli.command(), Commands::Check);
        assert_eq!(cli.config_dir, PathBuf::from("/etc/autoheal"));
    }
}
