//! Remediation plan types
//!
//! The oracle answers in free text around a JSON object. `RawPlan` mirrors
//! that wire schema loosely; `RemediationPlan` is the validated form the
//! executor consumes.

use serde::{Deserialize, Serialize};

use crate::error::HealError;

/// Category of fix proposed by the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixType {
    #[serde(alias = "docker_restart")]
    Restart,
    Rebuild,
    #[serde(alias = "config_change")]
    UpdateConfig,
    CodeEdit,
    Other,
}

impl FixType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixType::Restart => "restart",
            FixType::Rebuild => "rebuild",
            FixType::UpdateConfig => "update_config",
            FixType::CodeEdit => "code_edit",
            FixType::Other => "other",
        }
    }
}

impl std::fmt::Display for FixType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Oracle's self-reported confidence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    #[serde(alias = "LOW", alias = "Low")]
    Low,
    #[serde(alias = "MEDIUM", alias = "Medium")]
    Medium,
    #[serde(alias = "HIGH", alias = "High")]
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

/// A single exact-match replacement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChange {
    pub old_code: String,
    pub new_code: String,
    #[serde(default)]
    pub explanation: String,
}

/// Ordered replacements for one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub filename: String,
    #[serde(default)]
    pub changes: Vec<CodeChange>,
}

/// Wire schema of the oracle response
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlan {
    #[serde(default)]
    pub error_analysis: Option<String>,
    #[serde(default)]
    pub root_cause: Option<String>,
    pub fix_type: FixType,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub docker_commands: Vec<String>,
    #[serde(default)]
    pub files_to_edit: Vec<FileChange>,
    #[serde(default)]
    pub git_commit_message: Option<String>,
    #[serde(default)]
    pub confidence: Option<Confidence>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub testing_steps: Vec<String>,
}

/// What the executor is asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationAction {
    /// Run shell commands in order, stop at the first failure
    Operational { kind: FixType, commands: Vec<String> },
    /// Patch source files, commit, rebuild and redeploy
    CodeEdit {
        files: Vec<FileChange>,
        commit_message: Option<String>,
    },
}

/// Validated remediation plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationPlan {
    pub error_analysis: String,
    pub root_cause: Option<String>,
    pub confidence: Confidence,
    pub explanation: Option<String>,
    pub testing_steps: Vec<String>,
    pub action: RemediationAction,
    /// Set when this plan replaced an unusable oracle answer
    pub fallback: bool,
}

impl RemediationPlan {
    /// Built-in safe default: restart the container, low confidence
    pub fn safe_default(service: &str, reason: &str) -> Self {
        Self {
            error_analysis: reason.to_string(),
            root_cause: None,
            confidence: Confidence::Low,
            explanation: Some("Fallback to safe restart".to_string()),
            testing_steps: Vec::new(),
            action: RemediationAction::Operational {
                kind: FixType::Restart,
                commands: vec![format!("docker restart {}", service)],
            },
            fallback: true,
        }
    }

    pub fn fix_type(&self) -> FixType {
        match &self.action {
            RemediationAction::Operational { kind, .. } => *kind,
            RemediationAction::CodeEdit { .. } => FixType::CodeEdit,
        }
    }

    /// Operational commands, empty for code edits
    pub fn commands(&self) -> &[String] {
        match &self.action {
            RemediationAction::Operational { commands, .. } => commands,
            RemediationAction::CodeEdit { .. } => &[],
        }
    }

    pub fn file_changes(&self) -> &[FileChange] {
        match &self.action {
            RemediationAction::CodeEdit { files, .. } => files,
            RemediationAction::Operational { .. } => &[],
        }
    }

    pub fn commit_message(&self) -> Option<&str> {
        match &self.action {
            RemediationAction::CodeEdit { commit_message, .. } => commit_message.as_deref(),
            RemediationAction::Operational { .. } => None,
        }
    }
}

impl TryFrom<RawPlan> for RemediationPlan {
    type Error = HealError;

    fn try_from(raw: RawPlan) -> Result<Self, Self::Error> {
        let action = match raw.fix_type {
            FixType::CodeEdit => {
                if raw.files_to_edit.is_empty() {
                    return Err(HealError::InvalidPlan(
                        "code_edit plan has no files_to_edit".to_string(),
                    ));
                }
                for file in &raw.files_to_edit {
                    if file.filename.trim().is_empty() {
                        return Err(HealError::InvalidPlan("file entry without filename".to_string()));
                    }
                    if file.changes.is_empty() {
                        return Err(HealError::InvalidPlan(format!(
                            "no changes listed for {}",
                            file.filename
                        )));
                    }
                    if file.changes.iter().any(|c| c.old_code.is_empty()) {
                        return Err(HealError::InvalidPlan(format!(
                            "empty old_code for {}",
                            file.filename
                        )));
                    }
                }
                RemediationAction::CodeEdit {
                    files: raw.files_to_edit,
                    commit_message: raw
                        .git_commit_message
                        .filter(|m| !m.trim().is_empty()),
                }
            }
            kind => {
                let commands: Vec<String> = raw
                    .commands
                    .into_iter()
                    .chain(raw.docker_commands)
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
                if commands.is_empty() {
                    return Err(HealError::InvalidPlan(format!(
                        "{} plan has no commands",
                        kind
                    )));
                }
                RemediationAction::Operational { kind, commands }
            }
        };

        Ok(Self {
            error_analysis: raw.error_analysis.unwrap_or_default(),
            root_cause: raw.root_cause.filter(|r| !r.trim().is_empty()),
            confidence: raw.confidence.unwrap_or_default(),
            explanation: raw.explanation,
            testing_steps: raw.testing_steps,
            action,
            fallback: false,
        })
    }
}
