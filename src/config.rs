use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Container name of the monitored service
    pub name: String,
    /// Image tag used when rebuilding after a code edit
    pub image: String,
    /// Project directory holding the Dockerfile, sources and git checkout
    pub project_dir: PathBuf,
    /// Source files (relative to `project_dir`) the oracle may patch.
    /// Empty disables the code-editing variant.
    #[serde(default)]
    pub source_files: Vec<String>,
    /// Volume mounts `host:container[:mode]`; relative host paths are
    /// resolved against `project_dir`
    #[serde(default)]
    pub volumes: Vec<String>,
    /// Restart policy passed to `docker run --restart`
    #[serde(default = "default_restart_policy")]
    pub restart_policy: String,
}

fn default_restart_policy() -> String {
    "unless-stopped".to_string()
}

/// How log output is classified as anomalous
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// Any case-insensitive error marker
    #[default]
    Keywords,
    /// Only a canonical traceback header
    Traceback,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Number of log lines fetched per probe
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: u32,
    #[serde(default)]
    pub detection: DetectionMode,
    /// Lines kept from traceback extraction
    #[serde(default = "default_traceback_lines")]
    pub traceback_lines: usize,
    /// Lines kept from marker-window extraction
    #[serde(default = "default_marker_lines")]
    pub marker_lines: usize,
    /// Timeout for the status and log queries
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

fn default_log_tail_lines() -> u32 {
    200
}

fn default_traceback_lines() -> usize {
    100
}

fn default_marker_lines() -> usize {
    50
}

fn default_query_timeout() -> u64 {
    30
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            log_tail_lines: default_log_tail_lines(),
            detection: DetectionMode::default(),
            traceback_lines: default_traceback_lines(),
            marker_lines: default_marker_lines(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl ProbeConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// Which transport reaches the reasoning oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OracleBackend {
    /// HTTPS Messages API
    #[default]
    Api,
    /// Local `claude` CLI subprocess
    Cli,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub backend: OracleBackend,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_oracle_base_url")]
    pub base_url: String,
    #[serde(default = "default_oracle_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_cli_path")]
    pub cli_path: String,
    /// Characters of raw log tail embedded in the prompt
    #[serde(default = "default_log_excerpt_chars")]
    pub log_excerpt_chars: usize,
}

fn default_oracle_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_oracle_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_oracle_timeout() -> u64 {
    120
}

fn default_cli_path() -> String {
    "claude".to_string()
}

fn default_log_excerpt_chars() -> usize {
    5000
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            backend: OracleBackend::default(),
            api_key: String::new(),
            base_url: default_oracle_base_url(),
            model: default_oracle_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_oracle_timeout(),
            cli_path: default_cli_path(),
            log_excerpt_chars: default_log_excerpt_chars(),
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    /// Per-command timeout for operational commands
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Timeout for the image rebuild
    #[serde(default = "default_build_timeout")]
    pub build_timeout_secs: u64,
    /// Trailer appended to oracle-supplied commit messages
    #[serde(default = "default_fix_marker")]
    pub fix_marker: String,
    /// Push after committing
    #[serde(default = "default_push")]
    pub push: bool,
}

fn default_command_timeout() -> u64 {
    120
}

fn default_build_timeout() -> u64 {
    900
}

fn default_fix_marker() -> String {
    "\u{1f916} Auto-fixed by Autonomous Healer".to_string()
}

fn default_push() -> bool {
    true
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            build_timeout_secs: default_build_timeout(),
            fix_marker: default_fix_marker(),
            push: default_push(),
        }
    }
}

impl ExecutorConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

fn default_notify_timeout() -> u64 {
    15
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: default_telegram_api(),
            timeout_secs: default_notify_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for a daily rolling log file, in addition to stdout
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directory: None,
        }
    }
}

/// Credential variables honoured without the `AUTOHEAL_` prefix
const WELL_KNOWN_ENV: &[(&str, &str)] = &[
    ("ANTHROPIC_API_KEY", "oracle.api_key"),
    ("TELEGRAM_BOT_TOKEN", "notify.bot_token"),
    ("TELEGRAM_CHAT_ID", "notify.chat_id"),
];

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Self::defaults()?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("AUTOHEAL_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (AUTOHEAL_SERVICE__NAME, etc.)
            .add_source(
                Environment::with_prefix("AUTOHEAL")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("service.source_files")
                    .with_list_parse_key("service.volumes")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let mut builder = Config::builder()
            .set_default("service.name", "gmail-monitor")?
            .set_default("service.image", "gmail-telegram-monitor:latest")?
            .set_default("service.project_dir", "/root/n8n_workflows")?
            .set_default(
                "service.source_files",
                vec!["gmail_telegram_monitor.py", "start_monitor.py"],
            )?
            .set_default(
                "service.volumes",
                vec![
                    ".env:/app/.env:ro",
                    "credentials.json:/app/credentials.json:ro",
                    "token.json:/app/token.json:rw",
                ],
            )?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?;

        for (var, key) in WELL_KNOWN_ENV {
            if let Ok(value) = std::env::var(var) {
                builder = builder.set_default(*key, value)?;
            }
        }

        Ok(builder)
    }

    /// Whether the code-editing variant is enabled
    pub fn code_editing_enabled(&self) -> bool {
        !self.service.source_files.is_empty()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.service.name.trim().is_empty() {
            errors.push("service.name must be set".to_string());
        }

        if self.service.project_dir.as_os_str().is_empty() {
            errors.push("service.project_dir must be set".to_string());
        }

        if self.code_editing_enabled() && self.service.image.trim().is_empty() {
            errors.push("service.image must be set when source_files are configured".to_string());
        }

        if self.oracle.backend == OracleBackend::Api && self.oracle.api_key.is_empty() {
            errors.push("ANTHROPIC_API_KEY (oracle.api_key) not set".to_string());
        }

        if self.notify.bot_token.is_empty() || self.notify.chat_id.is_empty() {
            errors.push(
                "Telegram credentials not set (TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID)".to_string(),
            );
        }

        if self.executor.command_timeout_secs == 0 {
            errors.push("executor.command_timeout_secs must be positive".to_string());
        }

        for volume in &self.service.volumes {
            if volume.split(':').count() < 2 {
                errors.push(format!("volume '{volume}' must look like host:container[:mode]"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
