use thiserror::Error;

/// Main error type for the remediation engine
#[derive(Error, Debug)]
pub enum HealError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Subprocess errors
    #[error("Command timed out after {timeout_secs}s: {command}")]
    CommandTimeout { command: String, timeout_secs: u64 },

    #[error("Failed to spawn command '{command}': {reason}")]
    CommandSpawn { command: String, reason: String },

    // Oracle errors
    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Invalid remediation plan: {0}")]
    InvalidPlan(String),

    // Source patching errors
    #[error("Patch failed: {0}")]
    Patch(#[from] PatchError),

    // Notification errors
    #[error("Notification failed: {0}")]
    Notification(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for HealError
pub type Result<T> = std::result::Result<T, HealError>;

/// Specific error types for exact-match source patching
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("Could not find exact match in {filename}")]
    NotFound { filename: String },

    #[error("{filename} is not eligible for patching")]
    Ineligible { filename: String },

    #[error("{filename} resolves outside the project directory")]
    OutsideProject { filename: String },

    #[error("Error reading {filename}: {reason}")]
    Read { filename: String, reason: String },

    /// `written` lists the files of the batch already on disk
    #[error("Error writing {filename}: {reason}")]
    Write {
        filename: String,
        reason: String,
        written: Vec<String>,
    },

    #[error("No changes supplied for {filename}")]
    EmptyChangeSet { filename: String },
}

impl PatchError {
    /// Files left modified on disk when the batch failed
    pub fn written_files(&self) -> &[String] {
        match self {
            PatchError::Write { written, .. } => written,
            _ => &[],
        }
    }
}

impl HealError {
    /// Whether this error came from a bounded wait expiring
    pub fn is_timeout(&self) -> bool {
        matches!(self, HealError::CommandTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_error_converts() {
        let err: HealError = PatchError::NotFound {
            filename: "main.py".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Patch failed: Could not find exact match in main.py"
        );
    }

    #[test]
    fn test_timeout_detection() {
        let err = HealError::CommandTimeout {
            command: "docker restart svc".to_string(),
            timeout_secs: 120,
        };
        assert!(err.is_timeout());
        assert!(!HealError::Internal("x".to_string()).is_timeout());
    }
}
