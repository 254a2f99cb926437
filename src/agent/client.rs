//! Oracle backend using the local `claude` CLI
//!
//! The prompt is written to the CLI's stdin and the printed answer is read
//! back, bounded by the configured oracle timeout.

use crate::agent::oracle::Oracle;
use crate::config::OracleConfig;
use crate::error::{HealError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Oracle reached through a `claude --print` subprocess
pub struct CliOracle {
    config: OracleConfig,
}

impl CliOracle {
    pub fn new(config: OracleConfig) -> Self {
        Self { config }
    }

    /// Check if the claude CLI is available
    pub async fn check_availability(&self) -> bool {
        match Command::new(&self.config.cli_path).arg("--version").output().await {
            Ok(out) if out.status.success() => {
                let version = String::from_utf8_lossy(&out.stdout);
                info!("Claude CLI available: {}", version.trim());
                true
            }
            Ok(_) => {
                warn!("Claude CLI returned error status");
                false
            }
            Err(e) => {
                error!("Claude CLI not found at '{}': {}", self.config.cli_path, e);
                false
            }
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.cli_path);
        cmd.arg("--print")
            .arg("--output-format")
            .arg("text")
            .arg("--model")
            .arg(&self.config.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Oracle for CliOracle {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!("Spawning claude process");
        let mut child = self.command().spawn().map_err(|e| {
            HealError::Oracle(format!("Failed to spawn claude process: {}", e))
        })?;

        // One deadline covers feeding the prompt and collecting the answer
        let exchange = async move {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(prompt.as_bytes()).await.map_err(|e| {
                    HealError::Oracle(format!("Failed to write to claude stdin: {}", e))
                })?;
                // Closing stdin lets the CLI start answering
                drop(stdin);
            }
            child
                .wait_with_output()
                .await
                .map_err(|e| HealError::Oracle(format!("Failed to get claude output: {}", e)))
        };

        let output = timeout(self.config.timeout(), exchange)
            .await
            .map_err(|_| HealError::Oracle("Oracle query timed out".to_string()))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HealError::Oracle(format!("Claude process failed: {}", stderr)));
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        debug!("Raw oracle response: {} chars", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OracleBackend;

    fn config(cli_path: &str) -> OracleConfig {
        OracleConfig {
            backend: OracleBackend::Cli,
            api_key: String::new(),
            base_url: String::new(),
            model: "test-model".to_string(),
            max_tokens: 100,
            timeout_secs: 5,
            cli_path: cli_path.to_string(),
            log_excerpt_chars: 100,
        }
    }

    #[tokio::test]
    async fn test_missing_cli_is_oracle_error() {
        let oracle = CliOracle::new(config("/nonexistent/claude-cli"));
        assert!(!oracle.check_availability().await);
        let err = oracle.complete("hello").await.unwrap_err();
        assert!(err.to_string().contains("Failed to spawn"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stalled_cli_times_out_while_reading_prompt() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("stalled-cli");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut cfg = config(script.to_str().unwrap());
        cfg.timeout_secs = 1;
        let oracle = CliOracle::new(cfg);

        // Larger than a pipe buffer, so the write blocks on a reader that never comes
        let prompt = "x".repeat(4 * 1024 * 1024);
        let started = std::time::Instant::now();
        let err = oracle.complete(&prompt).await.unwrap_err();

        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }
}
