use serde::Serialize;

/// Outcome of one command in the execution trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed { exit_code: Option<i32>, stderr: String },
    TimedOut { timeout_secs: u64 },
    SpawnFailed { reason: String },
    /// Failed, but the step is allowed to fail (stop/rm of an absent container, git)
    Tolerated { reason: String },
}

impl StepStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, StepStatus::Succeeded | StepStatus::Tolerated { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub command: String,
    #[serde(flatten)]
    pub status: StepStatus,
}

/// Stage at which a remediation attempt gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStage {
    Commands,
    Patch,
    Rebuild,
}

impl std::fmt::Display for FailedStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailedStage::Commands => write!(f, "commands"),
            FailedStage::Patch => write!(f, "patch"),
            FailedStage::Rebuild => write!(f, "rebuild"),
        }
    }
}

/// Result of the commit/push step of a code edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GitOutcome {
    /// No commit message supplied
    Skipped,
    Committed { pushed: bool },
    Failed { reason: String },
}

/// What the executor did for one plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ExecutionResult {
    pub succeeded: bool,
    pub executed_steps: Vec<String>,
    pub output: Vec<String>,
    pub errors: Vec<String>,
    pub trace: Vec<StepRecord>,
    pub files_edited: Vec<String>,
    pub git: Option<GitOutcome>,
    pub failed_stage: Option<FailedStage>,
}

impl ExecutionResult {
    pub(crate) fn record(&mut self, command: &str, status: StepStatus) {
        self.executed_steps.push(command.to_string());
        self.trace.push(StepRecord {
            command: command.to_string(),
            status,
        });
    }

    pub(crate) fn fail(mut self, stage: FailedStage, error: String) -> Self {
        self.succeeded = false;
        self.failed_stage = Some(stage);
        self.errors.push(error);
        self
    }

    pub(crate) fn succeed(mut self) -> Self {
        self.succeeded = true;
        self.failed_stage = None;
        self
    }

    /// Errors joined and cut to at most `max_chars` characters
    pub fn error_summary(&self, max_chars: usize) -> String {
        let joined = self.errors.join("\n");
        match joined.char_indices().nth(max_chars) {
            Some((idx, _)) => joined[..idx].to_string(),
            None => joined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_summary_truncates_on_char_boundary() {
        let result = ExecutionResult::default().fail(FailedStage::Commands, "é".repeat(10));
        assert_eq!(result.error_summary(4), "éééé");
        assert_eq!(result.failed_stage, Some(FailedStage::Commands));
        assert!(!result.succeeded);
    }

    #[test]
    fn test_tolerated_counts_as_success() {
        assert!(StepStatus::Tolerated {
            reason: "No such container".to_string()
        }
        .is_success());
        assert!(!StepStatus::TimedOut { timeout_secs: 5 }.is_success());
    }
}
